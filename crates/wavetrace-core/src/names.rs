//! Signal name normalization shared by the parser, index and sampler

/// Strip a trailing bit-range suffix such as `[7:0]` from a signal name.
///
/// Only `msb:lsb` ranges are removed. A single index like `[3]` names one
/// bit of a split bus and stays part of the name.
pub fn strip_bit_range(name: &str) -> &str {
    let trimmed = name.trim_end();
    let Some(body) = trimmed.strip_suffix(']') else {
        return trimmed;
    };
    let Some(open) = body.rfind('[') else {
        return trimmed;
    };
    let range = &body[open + 1..];
    let is_range = match range.split_once(':') {
        Some((msb, lsb)) => is_index(msb) && is_index(lsb),
        None => false,
    };
    if is_range {
        trimmed[..open].trim_end()
    } else {
        trimmed
    }
}

#[inline]
fn is_index(s: &str) -> bool {
    let s = s.trim();
    let s = s.strip_prefix('-').unwrap_or(s);
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// Join a scope stack and a leaf name into a hierarchical path
pub fn join_path(scopes: &[String], name: &str) -> String {
    let leaf = strip_bit_range(name);
    if scopes.is_empty() {
        return leaf.to_string();
    }
    let mut path = scopes.join(&crate::types::SCOPE_SEPARATOR.to_string());
    path.push(crate::types::SCOPE_SEPARATOR);
    path.push_str(leaf);
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_bit_range() {
        assert_eq!(strip_bit_range("data[3:0]"), "data");
        assert_eq!(strip_bit_range("top.cpu.pc [31:0]"), "top.cpu.pc");
        assert_eq!(strip_bit_range("addr[0:-4]"), "addr");
        assert_eq!(strip_bit_range("clk"), "clk");
        assert_eq!(strip_bit_range("bus[3]"), "bus[3]");
        assert_eq!(strip_bit_range("weird[a:b]"), "weird[a:b]");
    }

    #[test]
    fn test_join_path() {
        let scopes = vec!["tb".to_string(), "dut".to_string()];
        assert_eq!(join_path(&scopes, "count[3:0]"), "tb.dut.count");
        assert_eq!(join_path(&[], "clk"), "clk");
    }
}
