pub const HTTPS_PORT: &str = "5001";

/// Turn a user-entered host into a base URL.
///
/// Any scheme the user typed is dropped; DSM serves HTTPS on 5001 and plain
/// HTTP everywhere else, so the port alone decides.
pub fn base_url(host: &str) -> String {
    let trimmed = host.trim().trim_end_matches('/');
    let bare = trimmed
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(trimmed);
    let scheme = if port_of(bare) == Some(HTTPS_PORT) {
        "https"
    } else {
        "http"
    };
    format!("{scheme}://{bare}")
}

fn port_of(authority: &str) -> Option<&str> {
    let (_, port) = authority.rsplit_once(':')?;
    if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) {
        Some(port)
    } else {
        None
    }
}

pub fn format_speed(bytes_per_sec: u64) -> String {
    if bytes_per_sec == 0 {
        return "–".to_string();
    }
    let kb = bytes_per_sec as f64 / 1024.0;
    if kb < 1024.0 {
        format!("{kb:.1} KB/s")
    } else {
        format!("{:.2} MB/s", kb / 1024.0)
    }
}

pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    if bytes == 0 {
        return "0 B".to_string();
    }

    let mut unit = 0;
    let mut size = bytes as f64;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{size:.2} {}", UNITS[unit])
    }
}
