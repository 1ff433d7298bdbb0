//! Generational handles and the slot table behind them
//!
//! Handles are the only way code outside the runtime refers to the things the
//! runtime owns. A handle is a `(slot, generation)` pair; releasing a slot
//! bumps its generation, so a handle kept past release never resolves to
//! whatever is stored in that slot afterwards.

use core::fmt;
use core::hash::{Hash, Hasher};
use core::marker::PhantomData;

use crate::error::HandleError;

/// Generational reference to a `T` stored in a [`HandleMap`]
pub struct Handle<T> {
    index: u32,
    generation: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    /// Build a handle from its raw parts
    #[inline]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self {
            index,
            generation,
            _marker: PhantomData,
        }
    }

    /// The handle that never resolves
    #[inline]
    pub const fn null() -> Self {
        Self::new(u32::MAX, u32::MAX)
    }

    /// True for [`Handle::null`]
    #[inline]
    pub const fn is_null(&self) -> bool {
        self.index == u32::MAX
    }

    /// Slot index
    #[inline]
    pub const fn index(&self) -> u32 {
        self.index
    }

    /// Slot generation at the time the handle was issued
    #[inline]
    pub const fn generation(&self) -> u32 {
        self.generation
    }

    /// Pack into a u64 (generation in the upper half) for crossing the script boundary
    #[inline]
    pub const fn to_bits(&self) -> u64 {
        ((self.generation as u64) << 32) | (self.index as u64)
    }

    /// Unpack from [`Handle::to_bits`]
    #[inline]
    pub const fn from_bits(bits: u64) -> Self {
        Self::new(bits as u32, (bits >> 32) as u32)
    }
}

// Written by hand so `T` needs none of these traits
impl<T> Clone for Handle<T> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.to_bits() == other.to_bits()
    }
}

impl<T> Eq for Handle<T> {}

impl<T> PartialOrd for Handle<T> {
    fn partial_cmp(&self, other: &Self) -> Option<core::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Handle<T> {
    fn cmp(&self, other: &Self) -> core::cmp::Ordering {
        (self.index, self.generation).cmp(&(other.index, other.generation))
    }
}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.to_bits());
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = core::any::type_name::<T>();
        let short = name.rsplit("::").next().unwrap_or(name);
        match self.is_null() {
            true => write!(f, "{}(null)", short),
            false => write!(f, "{}({}v{})", short, self.index, self.generation),
        }
    }
}

impl<T> Default for Handle<T> {
    fn default() -> Self {
        Self::null()
    }
}

// ============================================================================
// Slot table
// ============================================================================

struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Slot table owning the values its handles refer to.
///
/// Released slots are recycled with a bumped generation. A slot whose
/// generation is exhausted is retired for good, so no `(slot, generation)`
/// pair is ever issued twice. An optional slot limit turns growth past it
/// into [`HandleError::CapacityExceeded`].
pub struct HandleMap<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    live: usize,
    max_slots: u32,
}

impl<T> HandleMap<T> {
    /// Largest usable slot count; index `u32::MAX` is the null handle
    pub const MAX_SLOTS: u32 = u32::MAX - 1;

    /// Create an unbounded table
    pub fn new() -> Self {
        Self::with_limit(Self::MAX_SLOTS)
    }

    /// Create a table that never grows past `max_slots` slots
    pub fn with_limit(max_slots: u32) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
            max_slots: max_slots.min(Self::MAX_SLOTS),
        }
    }

    /// Store a value, reusing a released slot when one is available
    pub fn insert(&mut self, value: T) -> Result<Handle<T>, HandleError> {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(value);
            self.live += 1;
            return Ok(Handle::new(index, slot.generation));
        }

        let index = self.slots.len() as u32;
        if index >= self.max_slots {
            return Err(HandleError::CapacityExceeded {
                capacity: self.max_slots,
            });
        }
        self.slots.push(Slot {
            generation: 0,
            value: Some(value),
        });
        self.live += 1;
        Ok(Handle::new(index, 0))
    }

    /// Release a slot and hand back its value; `None` for stale handles
    pub fn remove(&mut self, handle: Handle<T>) -> Option<T> {
        self.check(handle).ok()?;
        let slot = &mut self.slots[handle.index() as usize];
        let value = slot.value.take();
        self.live -= 1;

        if slot.generation == u32::MAX {
            log::debug!("Retiring handle slot {} after exhausting its generations", handle.index());
        } else {
            slot.generation += 1;
            self.free.push(handle.index());
        }
        value
    }

    /// Explain why a handle does not resolve
    pub fn check(&self, handle: Handle<T>) -> Result<(), HandleError> {
        if handle.is_null() {
            return Err(HandleError::Null);
        }
        match self.slots.get(handle.index() as usize) {
            None => Err(HandleError::OutOfBounds),
            Some(slot) if slot.value.is_none() || slot.generation != handle.generation() => {
                Err(HandleError::Stale)
            }
            Some(_) => Ok(()),
        }
    }

    /// Whether the handle resolves to a live value
    #[inline]
    pub fn contains(&self, handle: Handle<T>) -> bool {
        self.check(handle).is_ok()
    }

    /// Borrow the value behind a handle
    pub fn get(&self, handle: Handle<T>) -> Option<&T> {
        let slot = self.slots.get(handle.index() as usize)?;
        if slot.generation != handle.generation() {
            return None;
        }
        slot.value.as_ref()
    }

    /// Mutably borrow the value behind a handle
    pub fn get_mut(&mut self, handle: Handle<T>) -> Option<&mut T> {
        let slot = self.slots.get_mut(handle.index() as usize)?;
        if slot.generation != handle.generation() {
            return None;
        }
        slot.value.as_mut()
    }

    /// Number of live values
    pub fn len(&self) -> usize {
        self.live
    }

    /// True if nothing is stored
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Slots created so far, live or not
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Configured slot limit
    pub fn max_slots(&self) -> u32 {
        self.max_slots
    }

    /// Live handles in slot order
    pub fn handles(&self) -> impl Iterator<Item = Handle<T>> + '_ {
        self.iter().map(|(handle, _)| handle)
    }

    /// Live handles and values in slot order
    pub fn iter(&self) -> impl Iterator<Item = (Handle<T>, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            let value = slot.value.as_ref()?;
            Some((Handle::new(index as u32, slot.generation), value))
        })
    }

    /// Live handles and mutable values in slot order
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Handle<T>, &mut T)> {
        self.slots.iter_mut().enumerate().filter_map(|(index, slot)| {
            let generation = slot.generation;
            let value = slot.value.as_mut()?;
            Some((Handle::new(index as u32, generation), value))
        })
    }
}

impl<T> Default for HandleMap<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for HandleMap<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandleMap")
            .field("live", &self.live)
            .field("slots", &self.slots.len())
            .field("max_slots", &self.max_slots)
            .finish()
    }
}
