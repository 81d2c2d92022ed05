use crate::error::{Error, Result};

const FILENAME_TOKEN: &str = "filename=";

/// Derive the on-disk artifact name from the response metadata.
///
/// Order: the `filename=` token of `Content-Disposition`; then the
/// effective URL's segment after the last `/`; if that is empty or
/// still carries a query, the same segment of the originally requested
/// URL. The winner must pass [`is_valid_file_name`].
pub fn resolve(
    effective_url: &str,
    content_disposition: Option<&str>,
    original_url: &str,
) -> Result<String> {
    let name = match content_disposition.and_then(from_content_disposition) {
        Some(name) => name,
        None => {
            let tail = url_tail(effective_url);
            if tail.is_empty() || tail.contains('?') {
                url_tail(original_url).to_string()
            } else {
                tail.to_string()
            }
        }
    };

    if !is_valid_file_name(&name) {
        return Err(Error::InvalidFilename(name));
    }
    Ok(name)
}

fn from_content_disposition(header: &str) -> Option<String> {
    let start = header.find(FILENAME_TOKEN)?;
    let rest = &header[start + FILENAME_TOKEN.len()..];
    let value = rest.split(';').next().unwrap_or(rest);
    let value = if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        &value[1..value.len() - 1]
    } else {
        value
    };
    Some(value.to_string())
}

fn url_tail(url: &str) -> &str {
    url.rsplit('/').next().unwrap_or(url)
}

/// Path-validity predicate for server-supplied names: a plain file
/// name with no separators, no traversal components, and no reserved
/// device names.
pub fn is_valid_file_name(name: &str) -> bool {
    if name.is_empty() || name == "." || name == ".." {
        return false;
    }
    if name.contains('/') || name.contains('\\') || name.contains('\0') {
        return false;
    }
    let stem = name.split('.').next().unwrap_or(name);
    !is_reserved_device_name(stem)
}

fn is_reserved_device_name(stem: &str) -> bool {
    let upper = stem.to_ascii_uppercase();
    if matches!(upper.as_str(), "CON" | "PRN" | "AUX" | "NUL") {
        return true;
    }
    if let Some(digit) = upper.strip_prefix("COM").or_else(|| upper.strip_prefix("LPT")) {
        return digit.len() == 1 && digit.chars().all(|c| c.is_ascii_digit() && c != '0');
    }
    false
}
