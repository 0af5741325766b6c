//! Equivalent curl commands for archive requests, handy when reporting bugs.

/// Single-quote `text` for a POSIX shell.
fn shell_quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', r"'\''"))
}

pub fn curl_find_str(search_spec: &serde_json::Value, url: &str) -> String {
    format!(
        "curl -X 'POST' -H 'Content-Type: application/json' -d {} {} | python3 -m json.tool",
        shell_quote(&search_spec.to_string()),
        shell_quote(url)
    )
}

pub fn curl_get_str(url: &str) -> String {
    format!("curl -H 'Content-Type: application/json' {}", shell_quote(url))
}
