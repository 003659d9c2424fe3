//! A builder for ELF string table sections.
//!
//! Strings are accumulated with [`StringTable::add`], then packed once by
//! [`StringTable::finalize`] into a blob of null-terminated records that
//! starts with a single null byte (so offset 0 is the empty string). A string
//! that is a suffix of another string does not get its own record: it shares
//! the tail of the longer string's record.

use std::collections::{HashMap, HashSet};

use crate::error::{Error, Result};

/// Accumulates a set of strings and packs them into a string table blob with
/// stable per-string offsets.
///
/// The packed layout is only decided by [`StringTable::finalize`]; before
/// that, [`StringTable::size`] reports an upper bound (as if no suffix ever
/// merged), which is what layout uses to reserve space. Strings added after
/// finalization are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StringTable {
    strings: HashSet<String>,
    packed: Option<Packed>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Packed {
    blob: Vec<u8>,
    offsets: HashMap<String, u64>,
}

impl StringTable {
    /// Create an empty string table. The empty string is always present at
    /// offset 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a string. Registering the same string twice is a no-op, as is
    /// registering any string after [`StringTable::finalize`].
    pub fn add(&mut self, string: &str) {
        if self.packed.is_none() && !string.is_empty() && !self.strings.contains(string) {
            self.strings.insert(string.to_owned());
        }
    }

    /// Whether [`StringTable::finalize`] has run
    pub fn is_finalized(&self) -> bool {
        self.packed.is_some()
    }

    /// Decide the packed layout. Idempotent.
    ///
    /// Strings are laid out longest-reversed-first so that any string which is
    /// a suffix of another lands inside that other's record: sorting by the
    /// reversed byte sequence makes every suffix an immediate successor of
    /// some record that contains it, so a single look-behind merge is exact.
    pub fn finalize(&mut self) {
        if self.packed.is_some() {
            return;
        }

        let mut ordered = self.strings.iter().cloned().collect::<Vec<_>>();
        ordered.sort_by(|a, b| b.as_bytes().iter().rev().cmp(a.as_bytes().iter().rev()));

        let mut blob = vec![0];
        let mut offsets = HashMap::with_capacity(ordered.len());
        let mut previous: Option<(String, u64)> = None;

        for string in ordered {
            let offset = match &previous {
                Some((prior, prior_offset)) if prior.ends_with(&string) => {
                    prior_offset + (prior.len() - string.len()) as u64
                }
                _ => {
                    let offset = blob.len() as u64;
                    blob.extend_from_slice(string.as_bytes());
                    blob.push(0);
                    offset
                }
            };
            offsets.insert(string.clone(), offset);
            previous = Some((string, offset));
        }

        self.packed = Some(Packed { blob, offsets });
    }

    /// The byte offset of `string` within the packed blob.
    ///
    /// Calling this before [`StringTable::finalize`] is a programming error
    /// and fails with [`Error::StringTableNotFinalized`]; looking up a string
    /// that was never registered fails with [`Error::BadLookup`].
    pub fn offset_of(&self, string: &str) -> Result<u64> {
        let packed = self
            .packed
            .as_ref()
            .ok_or(Error::StringTableNotFinalized)?;

        if string.is_empty() {
            return Ok(0);
        }

        packed
            .offsets
            .get(string)
            .copied()
            .ok_or_else(|| Error::BadLookup {
                string: string.to_owned(),
            })
    }

    /// The size of the packed blob once finalized. Before finalization this
    /// is an upper bound (the size with no suffix merged), which only grows
    /// as strings are added.
    pub fn size(&self) -> u64 {
        match &self.packed {
            Some(packed) => packed.blob.len() as u64,
            None => 1 + self
                .strings
                .iter()
                .map(|s| s.len() as u64 + 1)
                .sum::<u64>(),
        }
    }

    /// Copy the packed blob to the start of `out`
    pub fn write(&self, out: &mut [u8]) -> Result<()> {
        let packed = self
            .packed
            .as_ref()
            .ok_or(Error::StringTableNotFinalized)?;

        let actual = out.len() as u64;
        out.get_mut(..packed.blob.len())
            .ok_or(Error::OutputBufferTooSmall {
                required: packed.blob.len() as u64,
                actual,
            })?
            .copy_from_slice(&packed.blob);
        Ok(())
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_offsets_and_blob() {
        let mut table = StringTable::new();
        table.add(".text");
        table.add(".shstrtab");
        table.add(".text");
        table.finalize();

        let mut out = vec![0xaa; table.size() as usize];
        table.write(&mut out).unwrap();

        assert_eq!(out[0], 0);
        for name in [".text", ".shstrtab"] {
            let offset = table.offset_of(name).unwrap() as usize;
            assert_eq!(&out[offset..offset + name.len()], name.as_bytes());
            assert_eq!(out[offset + name.len()], 0);
        }
        assert_eq!(table.offset_of("").unwrap(), 0);
    }

    #[test]
    fn test_tail_merge_is_exact() {
        let mut table = StringTable::new();
        // Every string here is a byte suffix of the previous one, so the
        // whole chain shares ".shstrtab"'s tail; ".text"/"xt" form a second,
        // independent chain.
        for name in [".shstrtab", "shstrtab", "strtab", "tab", "ab", "b", ".text", "xt"] {
            table.add(name);
        }
        table.finalize();

        for (longer, shorter) in [
            (".shstrtab", "shstrtab"),
            ("shstrtab", "strtab"),
            ("strtab", "tab"),
            ("tab", "b"),
            (".shstrtab", "ab"),
            (".text", "xt"),
        ] {
            let end_longer = table.offset_of(longer).unwrap() + longer.len() as u64;
            let end_shorter = table.offset_of(shorter).unwrap() + shorter.len() as u64;
            assert_eq!(end_longer, end_shorter, "{shorter} not merged into {longer}");
        }

        // Only the two maximal strings occupy space.
        assert_eq!(
            table.size(),
            1 + (".shstrtab".len() as u64 + 1) + (".text".len() as u64 + 1)
        );
    }

    #[test]
    fn test_size_estimate_is_upper_bound() {
        let mut table = StringTable::new();
        assert_eq!(table.size(), 1);
        table.add("abc");
        table.add("bc");
        let estimate = table.size();
        assert_eq!(estimate, 1 + 4 + 3);
        table.finalize();
        assert!(table.size() <= estimate);
        assert_eq!(table.size(), 1 + 4);
    }

    #[test]
    fn test_lookup_errors() {
        let mut table = StringTable::new();
        table.add("present");
        assert_eq!(
            table.offset_of("present").unwrap_err(),
            Error::StringTableNotFinalized
        );

        table.finalize();
        assert!(table.offset_of("present").is_ok());
        assert_eq!(
            table.offset_of("absent").unwrap_err(),
            Error::BadLookup {
                string: "absent".into()
            }
        );
    }

    #[test]
    fn test_add_after_finalize_is_ignored() {
        let mut table = StringTable::new();
        table.add("a");
        table.finalize();
        let size = table.size();
        table.add("late");
        assert_eq!(table.size(), size);
        assert!(table.offset_of("late").is_err());
    }
}
