use rand::Rng;
use std::time::Duration;
use unicode_segmentation::UnicodeSegmentation;

/// Truncates a given string to a specified maximum width, appending an ellipsis (`…`)
/// if the string exceeds the specified width. Handles Unicode grapheme clusters properly.
///
/// # Panics
/// Panics if `max_width` is less than 2.
///
/// # Examples
/// ```rust
/// use panelmail::utils::truncate_message;
///
/// let message = "Hello World";
/// let truncated = truncate_message(message, 6);
/// assert_eq!(truncated, "Hello…");
///
/// let short_message = "Hi";
/// let truncated = truncate_message(short_message, 5);
/// assert_eq!(truncated, "Hi");
/// ```
pub fn truncate_message(message: &str, max_width: usize) -> String {
    assert!(
        max_width >= 2,
        "max_width must be at least 2 to accommodate the ellipsis"
    );

    let graphemes: Vec<&str> = message.graphemes(true).collect();

    if graphemes.len() > max_width {
        // Truncate to max_width - 1 to leave space for ellipsis
        let truncated: String = graphemes[..max_width - 1].concat();
        format!("{}…", truncated)
    } else {
        message.to_string()
    }
}

/// Generates a unique `Message-ID` value of the form `<hex@domain>` from 15
/// random bytes.
///
/// # Examples
///
/// ```rust
/// use panelmail::utils::generate_message_id;
///
/// let id = generate_message_id("grafana.example.com");
/// assert!(id.starts_with('<'));
/// assert!(id.ends_with("@grafana.example.com>"));
/// assert_eq!(id.len(), 1 + 30 + 1 + "grafana.example.com".len() + 1);
/// ```
pub fn generate_message_id(domain: &str) -> String {
    let mut bytes = [0u8; 15];
    rand::rng().fill(&mut bytes[..]);
    let hex: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
    format!("<{}@{}>", hex, domain)
}

/// Validates a basic HTTP authentication string in the format `username:password`.
///
/// # Errors
///
/// This function returns an error if:
/// - The input does not contain a colon (`:`) separating the username and password.
/// - The input lacks either the username or the password.
///
/// # Example
///
/// ```rust
/// use panelmail::utils::validate_basic_auth;
///
/// let valid = validate_basic_auth("user:pass");
/// assert!(valid.is_ok());
///
/// let invalid = validate_basic_auth("invalid_format");
/// assert!(invalid.is_err());
/// ```
pub fn validate_basic_auth(val: &str) -> Result<String, String> {
    match val.split_once(':') {
        Some((user, password)) if !user.is_empty() && !password.is_empty() => Ok(val.to_string()),
        Some(_) => Err(String::from(
            "Invalid format: must be `username:password` with non-empty values",
        )),
        None => Err(String::from("Invalid format: must be `username:password`")),
    }
}

pub fn kb(bytes: usize) -> String {
    let kilobytes = bytes as f64 / 1024.0;
    format!("{kilobytes:.2}kb")
}

pub fn percent(percent: f64) -> String {
    format!("{percent:.0}%")
}

pub fn ms(duration: Duration) -> String {
    let milliseconds = duration.as_millis() as f64;
    format!("{milliseconds:.2}ms")
}
