use std::collections::HashSet;

use ammonia::Builder;

/// Clean HTML content using the ammonia library.
///
/// Whitelist-based: safe tags (like <b>, <p>) survive, dangerous tags (like
/// <script>, <iframe>) and attributes (like onclick) are stripped. Comment bodies
/// go through this before being handed to an HTML renderer.
pub fn clean_html(input: &str) -> String {
    ammonia::clean(input)
}

/// Reduces a comment body to plain text for terminal display.
///
/// Every tag is dropped; the text inside harmless tags is kept, the content of
/// <script> and <style> is removed.
pub fn to_plain_text(input: &str) -> String {
    let stripped = Builder::empty()
        .clean_content_tags(HashSet::from(["script", "style"]))
        .clean(input)
        .to_string();
    html_escape::decode_html_entities(&stripped).into_owned()
}
