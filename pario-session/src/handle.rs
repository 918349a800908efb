//! Generation-tagged slot tables.
//!
//! A handle packs a slot index into its low 16 bits and the slot's generation into the high
//! 16 bits. Freeing a slot bumps its generation, so a handle to a freed resource never resolves
//! again, even after the slot is reused. A slot whose generation is exhausted is retired rather
//! than wrapped, so no handle value is ever issued twice.

use std::fmt::Display;
use std::ops::Deref;

use log::trace;
use pario_error::{PioResult, pio_bail, pio_err};

const INDEX_BITS: u32 = 16;
const INDEX_MASK: u32 = (1 << INDEX_BITS) - 1;

/// A typed handle backed by a packed `u32`.
pub(crate) trait Handle: Copy + Display + From<u32> + Into<u32> {}

macro_rules! define_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(u32);

        impl From<u32> for $name {
            fn from(value: u32) -> Self {
                Self(value)
            }
        }

        impl From<$name> for u32 {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl Deref for $name {
            type Target = u32;

            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}({:#x})", stringify!($name), self.0)
            }
        }

        impl Handle for $name {}
    };
}

define_handle!(
    /// Handle of a registered I/O system.
    IoSystemId
);
define_handle!(
    /// Handle of an open file.
    FileId
);
define_handle!(
    /// Handle of a registered decomposition.
    DecompId
);

#[derive(Debug)]
struct Slot<T> {
    generation: u16,
    value: Option<T>,
}

/// An arena of values addressed by generation-tagged handles.
///
/// Lookups tell apart handles that were never issued by this table (`InvalidArgument`) from
/// handles whose value has since been freed (`NotFound`).
#[derive(Debug)]
pub(crate) struct SlotTable<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u16>,
    len: usize,
}

impl<T> Default for SlotTable<T> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
        }
    }
}

impl<T> SlotTable<T> {
    /// Store the value built by `make`, which receives the handle the value will live under.
    pub fn insert_with<H: Handle>(&mut self, make: impl FnOnce(H) -> PioResult<T>) -> PioResult<H> {
        let index = match self.free.last() {
            Some(&index) => index,
            None => match u16::try_from(self.slots.len()) {
                Ok(index) => index,
                Err(_) => pio_bail!("registry is full at {} entries", self.slots.len()),
            },
        };
        let generation = self
            .slots
            .get(usize::from(index))
            .map_or(1, |slot| slot.generation);
        let handle = H::from(pack(index, generation));

        let value = make(handle)?;
        if usize::from(index) == self.slots.len() {
            self.slots.push(Slot {
                generation,
                value: Some(value),
            });
        } else {
            self.free.pop();
            if let Some(slot) = self.slots.get_mut(usize::from(index)) {
                slot.value = Some(value);
            }
        }
        self.len += 1;
        Ok(handle)
    }

    /// Resolve a handle to the index of a live slot.
    fn index_of<H: Handle>(&self, handle: H) -> PioResult<u16> {
        let (index, generation) = unpack(handle.into());
        let Some(slot) = self.slots.get(usize::from(index)) else {
            pio_bail!("{} was never issued", handle);
        };
        if generation == 0 || generation > slot.generation {
            pio_bail!("{} was never issued", handle);
        }
        if generation < slot.generation || slot.value.is_none() {
            pio_bail!(NotFound: "{} not found", handle);
        }
        Ok(index)
    }

    pub fn get<H: Handle>(&self, handle: H) -> PioResult<&T> {
        let index = self.index_of(handle)?;
        self.slots
            .get(usize::from(index))
            .and_then(|slot| slot.value.as_ref())
            .ok_or_else(|| pio_err!(NotFound: "{} not found", handle))
    }

    pub fn get_mut<H: Handle>(&mut self, handle: H) -> PioResult<&mut T> {
        let index = self.index_of(handle)?;
        self.slots
            .get_mut(usize::from(index))
            .and_then(|slot| slot.value.as_mut())
            .ok_or_else(|| pio_err!(NotFound: "{} not found", handle))
    }

    pub fn remove<H: Handle>(&mut self, handle: H) -> PioResult<T> {
        let index = self.index_of(handle)?;
        let Some((slot, value)) = self
            .slots
            .get_mut(usize::from(index))
            .and_then(|slot| slot.value.take().map(|value| (slot, value)))
        else {
            pio_bail!(NotFound: "{} not found", handle);
        };

        match slot.generation.checked_add(1) {
            Some(generation) => {
                slot.generation = generation;
                self.free.push(index);
            }
            None => trace!("retiring slot {} after its last generation", index),
        }
        self.len -= 1;
        Ok(value)
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.slots.iter().filter_map(|slot| slot.value.as_ref())
    }

    pub fn len(&self) -> usize {
        self.len
    }
}

fn pack(index: u16, generation: u16) -> u32 {
    (u32::from(generation) << INDEX_BITS) | u32::from(index)
}

fn unpack(raw: u32) -> (u16, u16) {
    let index = u16::try_from(raw & INDEX_MASK).unwrap_or(u16::MAX);
    let generation = u16::try_from(raw >> INDEX_BITS).unwrap_or(0);
    (index, generation)
}

#[cfg(test)]
mod tests {
    use pario_error::ErrorKind;
    use rstest::rstest;

    use super::*;

    #[test]
    fn insert_get_remove() {
        let mut table = SlotTable::default();
        let a: FileId = table.insert_with(|_| Ok("a")).unwrap();
        let b: FileId = table.insert_with(|_| Ok("b")).unwrap();
        assert_ne!(a, b);
        assert_eq!(table.get(a).unwrap(), &"a");
        assert_eq!(table.get(b).unwrap(), &"b");
        assert_eq!(table.len(), 2);

        assert_eq!(table.remove(a).unwrap(), "a");
        assert_eq!(table.get(a).unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(table.remove(a).unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn reused_slot_gets_new_generation() {
        let mut table = SlotTable::default();
        let first: FileId = table.insert_with(|_| Ok(1)).unwrap();
        table.remove(first).unwrap();
        let second: FileId = table.insert_with(|_| Ok(2)).unwrap();

        assert_eq!(*first & INDEX_MASK, *second & INDEX_MASK);
        assert_ne!(first, second);
        assert_eq!(table.get(first).unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(table.get(second).unwrap(), &2);
    }

    #[test]
    fn exhausted_slot_is_retired() {
        let mut table = SlotTable::default();
        let first: FileId = table.insert_with(|_| Ok(1)).unwrap();
        table.remove(first).unwrap();
        table.slots[0].generation = u16::MAX;
        table.free.clear();
        table.free.push(0);

        let last: FileId = table.insert_with(|_| Ok(2)).unwrap();
        assert_eq!(last, FileId::from(pack(0, u16::MAX)));
        table.remove(last).unwrap();

        let next: FileId = table.insert_with(|_| Ok(3)).unwrap();
        assert_eq!(next, FileId::from(pack(1, 1)));
        assert_eq!(table.get(last).unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(table.get(first).unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(table.get(next).unwrap(), &3);
    }

    #[rstest]
    #[case::generation_zero(pack(0, 0))]
    #[case::index_never_allocated(pack(5, 1))]
    #[case::future_generation(pack(0, 9))]
    #[case::garbage(0xdead_beef)]
    fn unissued_handles_are_invalid(#[case] raw: u32) {
        let mut table = SlotTable::default();
        let live: FileId = table.insert_with(|_| Ok(())).unwrap();
        table.remove(live).unwrap();
        table.insert_with::<FileId>(|_| Ok(())).unwrap();

        let handle = FileId::from(raw);
        assert_eq!(table.get(handle).unwrap_err().kind(), ErrorKind::InvalidArgument);
        assert_eq!(table.remove(handle).unwrap_err().kind(), ErrorKind::InvalidArgument);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn builder_sees_its_own_handle() {
        let mut table = SlotTable::default();
        let handle: DecompId = table.insert_with(Ok).unwrap();
        assert_eq!(table.get(handle).unwrap(), &handle);
    }

    #[test]
    fn failed_builder_leaves_table_untouched() {
        let mut table: SlotTable<u32> = SlotTable::default();
        assert!(table.insert_with::<FileId>(|_| pio_bail!("nope")).is_err());
        assert_eq!(table.len(), 0);
        let handle: FileId = table.insert_with(|_| Ok(7)).unwrap();
        assert_eq!(handle, FileId::from(pack(0, 1)));
    }

    #[test]
    fn handles_display() {
        assert_eq!(FileId::from(0x10002).to_string(), "FileId(0x10002)");
    }
}
