//! `ByteSize`: a `FromStr` newtype so CLI flags governed by C4's splitter
//! (`--blocksize`, `--offset`) accept `k`/`m`/`g` suffixes the way the
//! original tools' `siprefix2num` helper does (binary, 1024-based
//! multipliers, not decimal SI ones), instead of bare byte counts only.

use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteSize(pub u64);

impl FromStr for ByteSize {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err("empty size".to_string());
        }
        let (digits, multiplier) = match s.chars().last().unwrap().to_ascii_lowercase() {
            'k' => (&s[..s.len() - 1], 1024u64),
            'm' => (&s[..s.len() - 1], 1024 * 1024u64),
            'g' => (&s[..s.len() - 1], 1024 * 1024 * 1024u64),
            _ => (s, 1u64),
        };
        let value: u64 = digits.trim().parse().map_err(|_| format!("invalid byte size: {s:?}"))?;
        Ok(ByteSize(value * multiplier))
    }
}

impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_suffixes() {
        assert_eq!("10k".parse::<ByteSize>().unwrap().0, 10 * 1024);
        assert_eq!("5g".parse::<ByteSize>().unwrap().0, 5 * 1024 * 1024 * 1024);
        assert_eq!("1m".parse::<ByteSize>().unwrap().0, 1024 * 1024);
        assert_eq!("4096".parse::<ByteSize>().unwrap().0, 4096);
    }

    #[test]
    fn rejects_garbage() {
        assert!("not-a-size".parse::<ByteSize>().is_err());
        assert!("".parse::<ByteSize>().is_err());
    }
}
