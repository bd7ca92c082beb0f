const STRIPPED: [char; 7] = ['-', '_', ':', '.', ',', '(', ')'];

pub fn normalize_name(name: &str) -> String {
    name.chars()
        .flat_map(char::to_uppercase)
        .filter(|ch| !ch.is_whitespace() && !STRIPPED.contains(ch))
        .collect()
}
