//! The `Fields` container and the shared read surface of all header
//! containers and views.

use std::fmt;
use std::str;

use crate::metadata::{Kind, Metadata};
use crate::store::Store;
use crate::Result;

pub(crate) mod sealed {
    use crate::store::Store;

    pub trait HasStore {
        fn store(&self) -> &Store;
    }
}

use sealed::HasStore;

/// Read access shared by the owned containers and the views.
///
/// Field names are ASCII tokens and surface as `&str`; field values may
/// carry obs-text and surface as `&[u8]`.
pub trait Headers: HasStore {
    /// Number of fields.
    fn len(&self) -> usize {
        self.store().count()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The serialized bytes this object projects: for containers the
    /// whole header block, for a [`FieldsView`] just the field area.
    fn as_bytes(&self) -> &[u8] {
        self.store().as_bytes()
    }

    /// First value with this name, by case-insensitive comparison.
    fn get(&self, name: &str) -> Option<&[u8]> {
        let i = self.store().find(name.as_bytes())?;
        Some(self.store().value_bytes(i))
    }

    fn contains(&self, name: &str) -> bool {
        self.store().find(name.as_bytes()).is_some()
    }

    /// Iterate all fields in on-wire order.
    fn iter(&self) -> FieldIter<'_> {
        FieldIter {
            store: self.store(),
            index: 0,
        }
    }

    /// The incrementally maintained semantic summaries.
    ///
    /// Always default for a bare `Fields` container, which tracks no
    /// semantics.
    fn metadata(&self) -> &Metadata {
        self.store().metadata()
    }
}

/// One header field.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Field<'a> {
    pub(crate) name: &'a str,
    pub(crate) value: &'a [u8],
}

impl<'a> Field<'a> {
    pub fn name(&self) -> &'a str {
        self.name
    }

    pub fn value(&self) -> &'a [u8] {
        self.value
    }

    /// The value as a string, when it is valid UTF-8.
    pub fn value_str(&self) -> Option<&'a str> {
        str::from_utf8(self.value).ok()
    }
}

impl fmt::Debug for Field<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, String::from_utf8_lossy(self.value))
    }
}

/// Iterator over the fields of a container or view.
pub struct FieldIter<'a> {
    store: &'a Store,
    index: usize,
}

impl<'a> Iterator for FieldIter<'a> {
    type Item = Field<'a>;

    fn next(&mut self) -> Option<Field<'a>> {
        if self.index >= self.store.count() {
            return None;
        }
        let i = self.index;
        self.index += 1;
        let name = self.store.name_bytes(i);
        Some(Field {
            // names are validated tokens, always ASCII
            name: str::from_utf8(name).expect("ascii field name"),
            value: self.store.value_bytes(i),
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.store.count() - self.index;
        (left, Some(left))
    }
}

impl ExactSizeIterator for FieldIter<'_> {}

/// A mutable set of header fields without a start-line.
///
/// Serializes as zero or more `Name: Value\r\n` lines followed by the
/// final blank line. For request and response containers with the same
/// mutation surface plus a start-line, see [`crate::Request`] and
/// [`crate::Response`].
#[derive(Clone)]
pub struct Fields {
    store: Store,
}

impl Fields {
    pub fn new() -> Fields {
        Fields {
            store: Store::new(Kind::Fields),
        }
    }

    /// Parse a complete serialized field block, e.g.
    /// `"Host: x\r\n\r\n"`. Obs-folds are rewritten to spaces; the
    /// bytes are otherwise retained verbatim.
    pub fn parse(input: &[u8]) -> Result<Fields> {
        let mut f = Fields::new();
        let n = f.store.parse_block(input)?;
        if n != input.len() {
            return Err(crate::Error::BadFieldName);
        }
        Ok(f)
    }

    pub fn view(&self) -> FieldsView<'_> {
        FieldsView { store: &self.store }
    }

    pub(crate) fn store_mut(&mut self) -> &mut Store {
        &mut self.store
    }
}

impl Default for Fields {
    fn default() -> Self {
        Fields::new()
    }
}

impl HasStore for Fields {
    fn store(&self) -> &Store {
        &self.store
    }
}

impl Headers for Fields {}

impl fmt::Debug for Fields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fields").field("len", &self.len()).finish()
    }
}

/// Non-owning read view of the field area of any container.
#[derive(Clone, Copy)]
pub struct FieldsView<'a> {
    store: &'a Store,
}

impl<'a> FieldsView<'a> {
    pub(crate) fn new(store: &'a Store) -> FieldsView<'a> {
        FieldsView { store }
    }
}

impl HasStore for FieldsView<'_> {
    fn store(&self) -> &Store {
        self.store
    }
}

impl Headers for FieldsView<'_> {
    fn as_bytes(&self) -> &[u8] {
        &self.store.as_bytes()[self.store.prefix()..]
    }
}

impl fmt::Debug for FieldsView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldsView").field("len", &self.len()).finish()
    }
}

/// Generates the shared mutation surface for the owned containers.
///
/// Every method operates on the container's store, which keeps the
/// serialized bytes and the metadata summaries current in one step.
macro_rules! impl_field_ops {
    ($t:ty) => {
        impl $t {
            /// Append a field after all existing fields.
            ///
            /// Appending never shifts the index of existing fields.
            pub fn append(&mut self, name: &str, value: impl AsRef<[u8]>) -> crate::Result<()> {
                self.store_mut().append(name.as_bytes(), value.as_ref())
            }

            /// Insert a field so that it ends up at `index`.
            ///
            /// Panics when `index` is past the end.
            pub fn insert(
                &mut self,
                index: usize,
                name: &str,
                value: impl AsRef<[u8]>,
            ) -> crate::Result<()> {
                self.store_mut().insert(index, name.as_bytes(), value.as_ref())
            }

            /// Remove the field at `index`. Later fields shift down one.
            ///
            /// Panics when `index` is past the end.
            pub fn remove(&mut self, index: usize) {
                self.store_mut().remove(index)
            }

            /// Remove every field with this name. Returns how many were
            /// removed.
            pub fn remove_all(&mut self, name: &str) -> usize {
                self.store_mut().remove_all(name.as_bytes())
            }

            /// Replace the value of the field at `index`.
            ///
            /// Panics when `index` is past the end.
            pub fn set_value(&mut self, index: usize, value: impl AsRef<[u8]>) -> crate::Result<()> {
                self.store_mut().set_value(index, value.as_ref())
            }

            /// Remove every field with this name, then append one with
            /// the given value.
            pub fn set(&mut self, name: &str, value: impl AsRef<[u8]>) -> crate::Result<()> {
                self.store_mut().set(name.as_bytes(), value.as_ref())
            }

            /// Reset to the default contents for this container kind.
            /// Allocated capacity is retained.
            pub fn clear(&mut self) {
                self.store_mut().clear()
            }

            /// Grow the buffer to hold at least `n` serialized bytes.
            pub fn reserve_bytes(&mut self, n: usize) -> crate::Result<()> {
                self.store_mut().reserve_bytes(n)
            }

            /// Reallocate down to the smallest capacity that holds the
            /// current contents.
            pub fn shrink_to_fit(&mut self) {
                self.store_mut().shrink_to_fit()
            }

            /// Cap the container's growth. Defaults to the maximum
            /// single-block size of 64 KiB - 1.
            pub fn set_max_capacity(&mut self, n: usize) {
                self.store_mut().set_max_capacity(n)
            }
        }
    };
}

pub(crate) use impl_field_ops;

impl_field_ops!(Fields);

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn iterate_fields() {
        let mut f = Fields::new();
        f.append("Host", "a").unwrap();
        f.append("Accept", "*/*").unwrap();
        let v: Vec<_> = f.iter().map(|f| (f.name().to_string(), f.value().to_vec())).collect();
        assert_eq!(v.len(), 2);
        assert_eq!(v[0].0, "Host");
        assert_eq!(v[1].1, b"*/*");
        assert_eq!(f.iter().len(), 2);
    }

    #[test]
    fn get_is_case_insensitive() {
        let mut f = Fields::new();
        f.append("X-Token", "abc").unwrap();
        assert_eq!(f.get("x-token"), Some(&b"abc"[..]));
        assert!(f.contains("X-TOKEN"));
        assert_eq!(f.get("missing"), None);
    }

    #[test]
    fn parse_round_trip() {
        let block = b"Host: a\r\nAccept: */*\r\n\r\n";
        let f = Fields::parse(block).unwrap();
        assert_eq!(f.as_bytes(), block as &[u8]);
        assert_eq!(f.len(), 2);
    }

    #[test]
    fn parse_rejects_trailing_garbage() {
        assert!(Fields::parse(b"Host: a\r\n\r\nextra").is_err());
    }

    #[test]
    fn view_projects_field_area() {
        let mut f = Fields::new();
        f.append("A", "1").unwrap();
        let v = f.view();
        assert_eq!(v.as_bytes(), b"A: 1\r\n\r\n" as &[u8]);
        assert_eq!(v.get("a"), Some(&b"1"[..]));
    }

    #[test]
    fn known_good_reconstruction() {
        // a sequence of operations matches a byte-for-byte rebuild
        let mut f = Fields::new();
        f.append("A", "1").unwrap();
        f.append("B", "2").unwrap();
        f.insert(1, "C", "3").unwrap();
        f.set("A", "9").unwrap();
        f.set_value(0, "three").unwrap();
        f.remove(1);
        assert_eq!(f.as_bytes(), b"C: three\r\nA: 9\r\n\r\n" as &[u8]);
    }
}
