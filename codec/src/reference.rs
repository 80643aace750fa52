//! Reference tracking for shared and cyclic nodes.
//!
//! # Format
//!
//! Every value written through a ref-tracked or nullable path starts with a one-byte flag:
//!
//! ```txt
//! NULL_FLAG           (-3)  the value is absent, nothing follows
//! REF_FLAG            (-2)  varint id of a node already written in this call
//! NOT_NULL_VALUE_FLAG (-1)  the value follows and is not assigned an id
//! REF_VALUE_FLAG      ( 0)  the value follows and is assigned the next id
//! ```
//!
//! Ids are assigned in first-occurrence order starting at 0, on both sides.
//!
//! # Reading
//!
//! A node must be registered as soon as it is allocated, before any of its fields are read, so
//! that a field pointing back at it resolves to the same handle. Serializers call
//! [RefResolver::reference] right after allocation; it binds the node to the id reserved for the
//! value currently being read (if any).

use crate::{buffer, varint, Error, Handle, Value};
use bytes::{Buf, BufMut};
use std::collections::{HashMap, HashSet};

pub const NULL_FLAG: i8 = -3;
pub const REF_FLAG: i8 = -2;
pub const NOT_NULL_VALUE_FLAG: i8 = -1;
pub const REF_VALUE_FLAG: i8 = 0;

/// Outcome of reading a reference flag.
#[derive(Debug, PartialEq)]
pub enum RefRead {
    /// The value is absent.
    Null,
    /// The value is a node read earlier in this call.
    Existing(Value),
    /// The value follows without an id.
    NotNull,
    /// The value follows and is bound to this id.
    Preserved(u32),
}

/// Per-call reference table.
#[derive(Debug, Default)]
pub struct RefResolver {
    // Write side
    written: HashMap<Handle, u32>,
    active: HashSet<Handle>,

    // Read side
    read_objects: Vec<Option<Value>>,
    read_ref_ids: Vec<Option<u32>>,
}

impl RefResolver {
    /// Writes the flag for `handle`.
    ///
    /// Returns true if the caller must not write anything else (the node was already written
    /// and a back-reference was emitted).
    pub fn write_ref_or_null(&mut self, handle: Handle, buf: &mut impl BufMut) -> bool {
        let next = self.written.len() as u32;
        match self.written.get(&handle) {
            Some(id) => {
                buf.put_i8(REF_FLAG);
                varint::write(*id, buf);
                true
            }
            None => {
                self.written.insert(handle, next);
                buf.put_i8(REF_VALUE_FLAG);
                false
            }
        }
    }

    /// Marks `handle` as being written without tracking.
    ///
    /// Fails if the node is already being written further up (a cycle that only reference
    /// tracking could encode).
    pub fn enter(&mut self, handle: Handle) -> Result<(), Error> {
        if !self.active.insert(handle) {
            return Err(Error::Unsupported(format!(
                "cycle through {handle:?} without reference tracking"
            )));
        }
        Ok(())
    }

    pub fn leave(&mut self, handle: Handle) {
        self.active.remove(&handle);
    }

    /// Reads a flag, reserving an id if the value that follows should receive one.
    pub fn try_preserve_ref_id(&mut self, buf: &mut impl Buf) -> Result<RefRead, Error> {
        match buffer::read_i8(buf)? {
            NULL_FLAG => Ok(RefRead::Null),
            REF_FLAG => {
                let id = varint::read::<u32>(buf)?;
                Ok(RefRead::Existing(self.get_read_object(id)?))
            }
            NOT_NULL_VALUE_FLAG => Ok(RefRead::NotNull),
            REF_VALUE_FLAG => {
                let id = self.read_objects.len() as u32;
                self.read_objects.push(None);
                Ok(RefRead::Preserved(id))
            }
            flag => Err(Error::InvalidRefFlag(flag)),
        }
    }

    /// Returns the value bound to `id`.
    ///
    /// An id that was reserved but not bound yet (a record still reading its fields) resolves
    /// to [Value::Null].
    pub fn get_read_object(&self, id: u32) -> Result<Value, Error> {
        match self.read_objects.get(id as usize) {
            Some(value) => Ok(value.clone().unwrap_or(Value::Null)),
            None => Err(Error::UnknownRef(id)),
        }
    }

    /// Binds `value` to a reserved id.
    pub fn set_read_object(&mut self, id: u32, value: Value) {
        if let Some(slot) = self.read_objects.get_mut(id as usize) {
            *slot = Some(value);
        }
    }

    /// Pushes the id (if any) of the value about to be read and returns the depth to restore
    /// once it is read.
    pub fn preserve(&mut self, id: Option<u32>) -> usize {
        let depth = self.read_ref_ids.len();
        self.read_ref_ids.push(id);
        depth
    }

    /// Drops any id pushed at or above `depth` that was not consumed by [Self::reference].
    pub fn restore(&mut self, depth: usize) {
        self.read_ref_ids.truncate(depth);
    }

    /// Binds a freshly allocated node to the id of the value being read.
    pub fn reference(&mut self, value: &Value) {
        if let Some(Some(id)) = self.read_ref_ids.pop() {
            self.set_read_object(id, value.clone());
        }
    }

    /// Number of ids assigned so far (write side and read side).
    pub fn len(&self) -> usize {
        self.written.len().max(self.read_objects.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clears all state, keeping allocations.
    pub fn reset(&mut self) {
        self.written.clear();
        self.active.clear();
        self.read_objects.clear();
        self.read_ref_ids.clear();
    }
}
