use rand::Rng;

const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Generate a session ID: base-36 millisecond timestamp followed by 5 random
/// base-36 characters (e.g. `m1x2k3p4abcde`).
///
/// Short and sortable by creation time. Uniqueness among live sessions is
/// enforced by the registry, not by this function.
pub fn generate_session_id() -> String {
    let millis = chrono::Utc::now().timestamp_millis().max(0) as u64;
    let mut id = to_base36(millis);
    let mut rng = rand::thread_rng();
    for _ in 0..5 {
        id.push(BASE36[rng.gen_range(0..36)] as char);
    }
    id
}

fn to_base36(mut n: u64) -> String {
    if n == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while n > 0 {
        digits.push(BASE36[(n % 36) as usize]);
        n /= 36;
    }
    digits.reverse();
    String::from_utf8_lossy(&digits).into_owned()
}

/// Format a byte count as a human-readable string (B, KB, MB, GB, TB).
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * KB;
    const GB: u64 = 1024 * MB;
    const TB: u64 = 1024 * GB;

    if bytes >= TB {
        format!("{:.1} TB", bytes as f64 / TB as f64)
    } else if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Format a duration in seconds as a human-readable string.
///
/// - `< 60s`: shows seconds (e.g., "30s")
/// - `< 1h`: shows minutes + seconds (e.g., "1m 30s"), omits trailing zero
/// - `< 1d`: shows hours + minutes (e.g., "1h 1m"), omits trailing zero
/// - `>= 1d`: shows days + hours (e.g., "1d 1h"), omits trailing zero
pub fn format_duration(secs: u64) -> String {
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        let m = secs / 60;
        let s = secs % 60;
        if s > 0 {
            format!("{}m {}s", m, s)
        } else {
            format!("{}m", m)
        }
    } else if secs < 86400 {
        let h = secs / 3600;
        let m = (secs % 3600) / 60;
        if m > 0 {
            format!("{}h {}m", h, m)
        } else {
            format!("{}h", h)
        }
    } else {
        let d = secs / 86400;
        let h = (secs % 86400) / 3600;
        if h > 0 {
            format!("{}d {}h", d, h)
        } else {
            format!("{}d", d)
        }
    }
}

/// Build a log-safe preview of relayed terminal data.
///
/// Payloads longer than `2 * edge` characters keep the first and last `edge`
/// characters joined by `...`. CR and LF are escaped so the preview stays on
/// one log line.
pub fn payload_preview(data: &[u8], edge: usize) -> String {
    let text = String::from_utf8_lossy(data);
    let chars: Vec<char> = text.chars().collect();
    let shortened: String = if chars.len() > edge * 2 {
        let head: String = chars[..edge].iter().collect();
        let tail: String = chars[chars.len() - edge..].iter().collect();
        format!("{head}...{tail}")
    } else {
        text.into_owned()
    };
    shortened.replace('\n', "\\n").replace('\r', "\\r")
}

/// Replace the value of every `password` query parameter with `***`.
pub fn redact_query(query: &str) -> String {
    query
        .split('&')
        .map(|pair| match pair.split_once('=') {
            Some((key, _)) if key.eq_ignore_ascii_case("password") => format!("{key}=***"),
            _ => pair.to_string(),
        })
        .collect::<Vec<_>>()
        .join("&")
}
