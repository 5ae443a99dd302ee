/// Splits a comma-separated repository list. Items are trimmed, empty items
/// dropped, and repeated items kept once in first-seen order.
pub fn parse_repository_list(raw: &str) -> Vec<String> {
    let mut repositories: Vec<String> = Vec::new();
    for item in raw.split(',').map(str::trim).filter(|item| !item.is_empty()) {
        if !repositories.iter().any(|existing| existing == item) {
            repositories.push(item.to_string());
        }
    }
    repositories
}
