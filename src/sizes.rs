use crate::monitor::{MonitorError, Result};

/// Parse a human-readable size string ("100MB", "1.5GB", "512") into bytes.
///
/// Units are powers of 1024; `K`/`KB`, `M`/`MB` and `G`/`GB` are accepted in
/// any case, and a bare number is taken as bytes. An unrecognized unit is a
/// hard configuration error: a misconfigured threshold must not silently
/// become zero (trigger every tick) or unbounded (never trigger).
pub fn parse_size(text: &str) -> Result<u64> {
    let mantissa: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    let unit: String = text
        .chars()
        .filter(|c| !c.is_ascii_digit() && *c != '.')
        .collect::<String>()
        .trim()
        .to_uppercase();

    let value: f64 = mantissa.parse().map_err(|_| MonitorError::Configuration {
        message: format!("no numeric value in size \"{text}\""),
    })?;

    let multiplier: u64 = match unit.as_str() {
        "" => 1,
        "K" | "KB" => 1024,
        "M" | "MB" => 1024 * 1024,
        "G" | "GB" => 1024 * 1024 * 1024,
        other => {
            return Err(MonitorError::Configuration {
                message: format!("unrecognized size unit \"{other}\" in \"{text}\""),
            })
        }
    };

    Ok((value * multiplier as f64) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_bytes() {
        assert_eq!(parse_size("512").unwrap(), 512);
        assert_eq!(parse_size("0").unwrap(), 0);
    }

    #[test]
    fn parses_binary_units() {
        assert_eq!(parse_size("1KB").unwrap(), 1024);
        assert_eq!(parse_size("100MB").unwrap(), 104_857_600);
        assert_eq!(parse_size("1GB").unwrap(), 1_073_741_824);
        assert_eq!(parse_size("2G").unwrap(), 2_147_483_648);
    }

    #[test]
    fn parses_fractional_mantissa() {
        assert_eq!(parse_size("1.5MB").unwrap(), 1_572_864);
        assert_eq!(parse_size("1.5GB").unwrap(), 1_610_612_736);
    }

    #[test]
    fn unit_is_case_insensitive() {
        assert_eq!(parse_size("100mb").unwrap(), parse_size("100MB").unwrap());
        assert_eq!(parse_size("1gb").unwrap(), parse_size("1GB").unwrap());
    }

    #[test]
    fn tolerates_whitespace_before_unit() {
        assert_eq!(parse_size("100 MB").unwrap(), 104_857_600);
    }

    #[test]
    fn rejects_unknown_unit_by_name() {
        let err = parse_size("3XB").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("XB"), "error should name the unit: {message}");
    }

    #[test]
    fn rejects_missing_mantissa() {
        assert!(parse_size("MB").is_err());
        assert!(parse_size("").is_err());
    }
}
