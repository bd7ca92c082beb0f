mod acf;
mod app;
mod catalog;
mod cli;
mod config;
mod logging;
mod normalize;
mod repair;
mod steam;
mod template;

fn main() {
    if let Err(err) = cli::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
