//! On-disk index line format: encode/decode and flavor classification.
//!
//! A line is `identifier <TAB> position_field [<TAB> checksum]`, except in
//! `nopos` flavor where a line is just `identifier` with no tab at all.
//! `position_field` carries both the byte offset/length and, via its
//! separator character, which of plain/deflate/encrypt/deflate+encrypt
//! transform was applied to the entry it describes:
//!
//! | Flavor | form | separator |
//! |---|---|---|
//! | plain | `P-L` | `-` |
//! | deflate | `P:L` | `:` |
//! | encrypt | `P.L\|Xhex(iv)` | `.` |
//! | deflate+encrypt | `P+L\|Xhex(iv)` | `+` |
//! | nopos | `identifier` | (no position field) |
//!
//! An index file holds exactly one flavor throughout; [`classify`] inspects
//! only the first line, and every later line is parsed against that flavor.

use crate::b64;
use crate::crypto::CipherKind;
use crate::error::IndexError;

pub const FIELDSEP: char = '\t';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flavor {
    Plain,
    Deflate,
    Encrypt,
    Both,
    NoPos,
}

impl Flavor {
    fn separator(self) -> Option<char> {
        match self {
            Flavor::Plain => Some('-'),
            Flavor::Deflate => Some(':'),
            Flavor::Encrypt => Some('.'),
            Flavor::Both => Some('+'),
            Flavor::NoPos => None,
        }
    }

    pub fn is_encrypted(self) -> bool {
        matches!(self, Flavor::Encrypt | Flavor::Both)
    }

    pub fn is_compressed(self) -> bool {
        matches!(self, Flavor::Deflate | Flavor::Both)
    }
}

/// Result of inspecting an index file's first line.
#[derive(Debug, Clone, Copy)]
pub struct IndexClass {
    pub flavor: Flavor,
    pub cipher: Option<CipherKind>,
    pub has_checksum: bool,
}

/// A fully decoded index line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub identifier: String,
    pub position: u64,
    pub length: u64,
    pub iv: Option<[u8; 16]>,
    pub checksum: Option<u32>,
}

fn is_b64_symbol(c: char) -> bool {
    b64::ALPHABET.contains(&(c as u8))
}

/// Split `P<sep>L` and, for encrypted flavors, the trailing `|Xhex(iv)`.
fn split_position_field(field: &str, flavor: Flavor) -> Result<(u64, u64, Option<char>, Option<String>), IndexError> {
    let sep = flavor.separator().expect("nopos has no position field");
    let (posline, cipher_iv) = match field.split_once('|') {
        Some((p, rest)) => (p, Some(rest)),
        None => (field, None),
    };
    let sep_idx = posline
        .find(sep)
        .filter(|&i| i > 0 && posline[..i].chars().all(is_b64_symbol))
        .ok_or_else(|| IndexError::MalformedIndex(field.to_string()))?;
    let (p_str, l_str) = (&posline[..sep_idx], &posline[sep_idx + sep.len_utf8()..]);
    if p_str.is_empty() || l_str.is_empty() || !l_str.chars().all(is_b64_symbol) {
        return Err(IndexError::MalformedIndex(field.to_string()));
    }
    let position = b64::b64_to_int(p_str)?;
    let length = b64::b64_to_int(l_str)?;

    match (flavor.is_encrypted(), cipher_iv) {
        (true, Some(tail)) => {
            let mut chars = tail.chars();
            let letter = chars
                .next()
                .ok_or_else(|| IndexError::MissingIv(field.to_string()))?;
            let hex_iv: String = chars.collect();
            Ok((position, length, Some(letter), Some(hex_iv)))
        }
        (true, None) => Err(IndexError::MissingIv(field.to_string())),
        (false, None) => Ok((position, length, None, None)),
        (false, Some(_)) => Err(IndexError::MalformedIndex(field.to_string())),
    }
}

/// Determine flavor, cipher and checksum presence from an index's first
/// line. Fails with [`IndexError::MalformedIndex`] if the line has no
/// recognizable shape and [`IndexError::UnknownCipher`] if an encrypted
/// flavor's cipher letter is not `A`, `B` or `C`.
pub fn classify(first_line: &str) -> Result<IndexClass, IndexError> {
    let fields: Vec<&str> = first_line.trim_end_matches('\n').split(FIELDSEP).collect();
    match fields.len() {
        1 => Ok(IndexClass {
            flavor: Flavor::NoPos,
            cipher: None,
            has_checksum: false,
        }),
        2 | 3 => {
            let field = fields[1];
            let has_checksum = fields.len() == 3;
            for flavor in [Flavor::Encrypt, Flavor::Both, Flavor::Deflate, Flavor::Plain] {
                if let Ok((_, _, letter, _)) = split_position_field(field, flavor) {
                    let cipher = match letter {
                        Some(l) => Some(CipherKind::from_letter(l).map_err(|_| IndexError::UnknownCipher(l))?),
                        None => None,
                    };
                    return Ok(IndexClass {
                        flavor,
                        cipher,
                        has_checksum,
                    });
                }
            }
            Err(IndexError::MalformedIndex(first_line.to_string()))
        }
        _ => Err(IndexError::MalformedIndex(first_line.to_string())),
    }
}

/// Parse one line against an already-known flavor (from [`classify`]).
pub fn parse_line(line: &str, flavor: Flavor) -> Result<IndexEntry, IndexError> {
    let line = line.trim_end_matches('\n');
    if flavor == Flavor::NoPos {
        return Ok(IndexEntry {
            identifier: line.to_string(),
            position: 0,
            length: 0,
            iv: None,
            checksum: None,
        });
    }
    let fields: Vec<&str> = line.split(FIELDSEP).collect();
    if fields.len() < 2 {
        return Err(IndexError::MalformedIndex(line.to_string()));
    }
    let (position, length, _letter, iv_hex) = split_position_field(fields[1], flavor)?;
    let iv = match iv_hex {
        Some(hex_str) => {
            let bytes = hex::decode(&hex_str).map_err(|_| IndexError::MissingIv(line.to_string()))?;
            let arr: [u8; 16] = bytes
                .try_into()
                .map_err(|_| IndexError::MissingIv(line.to_string()))?;
            Some(arr)
        }
        None => None,
    };
    let checksum = match fields.get(2) {
        Some(cs) => Some(b64::b64_to_int(cs)? as u32),
        None => None,
    };
    Ok(IndexEntry {
        identifier: fields[0].to_string(),
        position,
        length,
        iv,
        checksum,
    })
}

/// Render one index line for `identifier` under `flavor`.
#[allow(clippy::too_many_arguments)]
pub fn format_line(
    identifier: &str,
    flavor: Flavor,
    position: u64,
    length: u64,
    cipher: Option<CipherKind>,
    iv: Option<&[u8; 16]>,
    checksum: Option<u32>,
) -> String {
    if flavor == Flavor::NoPos {
        return format!("{identifier}\n");
    }
    let sep = flavor.separator().expect("checked above");
    let mut out = format!(
        "{identifier}{FIELDSEP}{}{sep}{}",
        b64::int_to_b64(position),
        b64::int_to_b64(length)
    );
    if flavor.is_encrypted() {
        let letter = cipher.expect("encrypted flavor needs a cipher kind").letter();
        let iv = iv.expect("encrypted flavor needs an iv");
        out.push('|');
        out.push(letter);
        out.push_str(&hex::encode(iv));
    }
    if let Some(cs) = checksum {
        out.push(FIELDSEP);
        out.push_str(&b64::int_to_b64(cs as u64));
    }
    out.push('\n');
    out
}
