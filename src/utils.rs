pub fn format_shape(shape: &[usize]) -> String {
    format!(
        "({})",
        shape
            .iter()
            .map(|x| x.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    )
}

/// Render a byte count with binary units and two decimals, e.g. `1.50K`.
///
/// Returns an empty string for NaN (and infinities) so a report never shows `nan`.
pub fn readable_size(bytes: f64) -> String {
    const UNITS: &[&str] = &["B", "K", "M", "G", "T", "P"];

    if !bytes.is_finite() {
        return String::new();
    }

    // Negative counts never reach a unit threshold and stay in bytes.
    let mut size = bytes;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    format!("{:.2}{}", size, UNITS[unit_idx])
}

pub fn natural_sort_key(name: &str) -> Vec<NaturalSortItem> {
    let mut result = Vec::new();
    let mut current_number = String::new();
    let mut current_text = String::new();

    for ch in name.chars() {
        if ch.is_ascii_digit() {
            if !current_text.is_empty() {
                result.push(NaturalSortItem::Text(std::mem::take(&mut current_text)));
            }
            current_number.push(ch);
        } else {
            if !current_number.is_empty() {
                result.push(NaturalSortItem::from_digits(std::mem::take(
                    &mut current_number,
                )));
            }
            current_text.push(ch);
        }
    }

    if !current_number.is_empty() {
        result.push(NaturalSortItem::from_digits(current_number));
    }
    if !current_text.is_empty() {
        result.push(NaturalSortItem::Text(current_text));
    }

    result
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum NaturalSortItem {
    Text(String),
    Number(u64),
}

impl NaturalSortItem {
    fn from_digits(digits: String) -> Self {
        match digits.parse::<u64>() {
            Ok(num) => NaturalSortItem::Number(num),
            // Too long for u64
            Err(_) => NaturalSortItem::Text(digits),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_readable_size_bytes() {
        assert_eq!(readable_size(0.0), "0.00B");
        assert_eq!(readable_size(512.0), "512.00B");
        assert_eq!(readable_size(1023.0), "1023.00B");
        assert_eq!(readable_size(0.5), "0.50B");
    }

    #[test]
    fn test_readable_size_binary_steps() {
        assert_eq!(readable_size(1024.0), "1.00K");
        assert_eq!(readable_size(1536.0), "1.50K");
        assert_eq!(readable_size(1_048_576.0), "1.00M");
        assert_eq!(readable_size(3.0 * 1024.0 * 1024.0 * 1024.0), "3.00G");
        assert_eq!(readable_size(1024f64.powi(4)), "1.00T");
    }

    #[test]
    fn test_readable_size_caps_at_largest_unit() {
        assert_eq!(readable_size(2048.0 * 1024f64.powi(5)), "2048.00P");
    }

    #[test]
    fn test_readable_size_negative_stays_in_bytes() {
        assert_eq!(readable_size(-2048.0), "-2048.00B");
        assert_eq!(readable_size(-1.5), "-1.50B");
    }

    #[test]
    fn test_readable_size_nan_is_blank() {
        assert_eq!(readable_size(f64::NAN), "");
        assert_eq!(readable_size(f64::INFINITY), "");
    }

    #[test]
    fn test_format_shape() {
        assert_eq!(format_shape(&[2, 3]), "(2, 3)");
        assert_eq!(format_shape(&[7]), "(7)");
        assert_eq!(format_shape(&[]), "()");
    }

    #[test]
    fn test_natural_sort_orders_digit_runs_numerically() {
        let mut names = vec!["layer.10.w", "layer.2.w", "layer.1.w"];
        names.sort_by_key(|n| natural_sort_key(n));
        assert_eq!(names, vec!["layer.1.w", "layer.2.w", "layer.10.w"]);
    }
}
