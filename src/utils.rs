/// Splits the key at its final extension, `images/pic.png` becomes
/// `("images/pic", ".png")`.
///
/// Only the last path element is considered, a key without a dot in its
/// final element has an empty extension.
pub fn split_extension(key: &str) -> (&str, &str) {
    let name_start = key.rfind('/').map(|i| i + 1).unwrap_or(0);
    match key[name_start..].rfind('.') {
        Some(dot) => key.split_at(name_start + dot),
        None => (key, ""),
    }
}
