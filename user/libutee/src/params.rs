//! Parameter marshalling between `utee_params` and the TA's `TEE_Param` array.
//!
//! The transport hands the TA a compact block: one 64-bit word of packed
//! slot types and two 64-bit words per slot. The TA entry points see a
//! typed [`Params`] instead. `decode` runs before every callback and
//! `encode` after it; the pair is pure and keeps nothing between calls.

use bitflags::bitflags;
use num_enum::TryFromPrimitive;

use crate::result::EntryError;

/// Number of parameter slots in every call.
pub const TEE_NUM_PARAMS: usize = 4;

// ── Slot types ──────────────────────────────────────────────────

const TEE_PARAM_TYPE_NONE: u8 = 0;
const TEE_PARAM_TYPE_VALUE_INPUT: u8 = 1;
const TEE_PARAM_TYPE_VALUE_OUTPUT: u8 = 2;
const TEE_PARAM_TYPE_VALUE_INOUT: u8 = 3;
const TEE_PARAM_TYPE_MEMREF_INPUT: u8 = 5;
const TEE_PARAM_TYPE_MEMREF_OUTPUT: u8 = 6;
const TEE_PARAM_TYPE_MEMREF_INOUT: u8 = 7;

/// `TEE_PARAM_TYPE_*` from `tee_api_defines.h`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, TryFromPrimitive)]
#[repr(u8)]
pub enum ParamType {
    #[default]
    None = TEE_PARAM_TYPE_NONE,
    ValueInput = TEE_PARAM_TYPE_VALUE_INPUT,
    ValueOutput = TEE_PARAM_TYPE_VALUE_OUTPUT,
    ValueInout = TEE_PARAM_TYPE_VALUE_INOUT,
    MemrefInput = TEE_PARAM_TYPE_MEMREF_INPUT,
    MemrefOutput = TEE_PARAM_TYPE_MEMREF_OUTPUT,
    MemrefInout = TEE_PARAM_TYPE_MEMREF_INOUT,
}

bitflags! {
    /// Which way data flows through a slot.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ParamDirection: u8 {
        const INPUT = 1 << 0;
        const OUTPUT = 1 << 1;
    }
}

impl ParamType {
    pub fn direction(self) -> ParamDirection {
        match self {
            ParamType::None => ParamDirection::empty(),
            ParamType::ValueInput | ParamType::MemrefInput => ParamDirection::INPUT,
            ParamType::ValueOutput | ParamType::MemrefOutput => ParamDirection::OUTPUT,
            ParamType::ValueInout | ParamType::MemrefInout => {
                ParamDirection::INPUT | ParamDirection::OUTPUT
            }
        }
    }

    #[inline]
    pub fn is_value(self) -> bool {
        matches!(
            self,
            ParamType::ValueInput | ParamType::ValueOutput | ParamType::ValueInout
        )
    }

    #[inline]
    pub fn is_memref(self) -> bool {
        matches!(
            self,
            ParamType::MemrefInput | ParamType::MemrefOutput | ParamType::MemrefInout
        )
    }

    /// The TA may write this slot back to the caller.
    #[inline]
    pub fn is_output(self) -> bool {
        self.direction().contains(ParamDirection::OUTPUT)
    }

    fn try_from_nibble(raw: u64) -> Result<Self, EntryError> {
        let nibble = u8::try_from(raw & 0xF).map_err(|_| EntryError::BadParameters)?;
        ParamType::try_from(nibble).map_err(|_| EntryError::BadParameters)
    }
}

/// Packed slot types as TA code sees them: `TEE_PARAM_TYPES(t0, t1, t2, t3)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ParamTypes(u32);

impl ParamTypes {
    pub const NONE: Self = Self(0);

    pub const fn new(types: [ParamType; TEE_NUM_PARAMS]) -> Self {
        Self(
            types[0] as u32
                | (types[1] as u32) << 4
                | (types[2] as u32) << 8
                | (types[3] as u32) << 12,
        )
    }

    /// Type of slot `index`, or `None` when `index` is out of range.
    pub fn get(self, index: usize) -> Option<ParamType> {
        if index >= TEE_NUM_PARAMS {
            return None;
        }
        let nibble = ((self.0 >> (index * 4)) & 0xF) as u8;
        ParamType::try_from(nibble).ok()
    }

    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }
}

// ── External block (utee_params) ────────────────────────────────

/// `struct utee_params` from `utee_types.h`.
///
/// Slot `n` has its type in nibble `n` of `types`; its two words are
/// `vals[2n]` and `vals[2n + 1]` (value a/b, or buffer address/size).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(C)]
pub struct UteeParams {
    pub types: u64,
    pub vals: [u64; TEE_NUM_PARAMS * 2],
}

impl UteeParams {
    pub fn slot_type(&self, index: usize) -> Result<ParamType, EntryError> {
        if index >= TEE_NUM_PARAMS {
            return Err(EntryError::BadParameters);
        }
        ParamType::try_from_nibble(self.types >> (index * 4))
    }

    /// Fill slot `index`. Used by transports assembling a call.
    ///
    /// # Panics
    /// Panics if `index` is not below [`TEE_NUM_PARAMS`].
    pub fn set_slot(&mut self, index: usize, typ: ParamType, a: u64, b: u64) {
        assert!(index < TEE_NUM_PARAMS, "BUG: parameter slot {index} out of range");
        let shift = index * 4;
        self.types = (self.types & !(0xF << shift)) | (u64::from(typ as u8) << shift);
        self.vals[index * 2] = a;
        self.vals[index * 2 + 1] = b;
    }

    /// The two words of slot `index`.
    pub fn words(&self, index: usize) -> Option<(u64, u64)> {
        if index >= TEE_NUM_PARAMS {
            return None;
        }
        Some((self.vals[index * 2], self.vals[index * 2 + 1]))
    }
}

// ── Internal block (TEE_Param[4]) ───────────────────────────────

/// One `TEE_Param`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Param {
    #[default]
    None,
    Value { a: u32, b: u32 },
    /// A caller-shared buffer. The address belongs to the TA's mapping of
    /// the caller's memory and is only valid for the current call.
    Memref { buffer: *mut u8, size: usize },
}

/// The call-local parameter block handed to TA entry points.
///
/// Slot kinds are fixed by the caller: a TA may change the values in a
/// slot but not its type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Params {
    types: ParamTypes,
    slots: [Param; TEE_NUM_PARAMS],
}

impl Params {
    /// All four slots `NONE`.
    pub fn empty() -> Self {
        Self::default()
    }

    #[inline]
    pub fn types(&self) -> ParamTypes {
        self.types
    }

    pub fn get(&self, index: usize) -> Option<&Param> {
        self.slots.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Param> {
        self.slots.get_mut(index)
    }

    pub fn value(&self, index: usize) -> Option<(u32, u32)> {
        match self.slots.get(index)? {
            Param::Value { a, b } => Some((*a, *b)),
            _ => None,
        }
    }

    /// Overwrite the value pair of a value slot. Returns `false` if the
    /// slot is not a value slot.
    pub fn set_value(&mut self, index: usize, a: u32, b: u32) -> bool {
        match self.slots.get_mut(index) {
            Some(Param::Value { a: slot_a, b: slot_b }) => {
                *slot_a = a;
                *slot_b = b;
                true
            }
            _ => false,
        }
    }

    /// Shrink the reported size of a memref slot (e.g. bytes produced).
    /// Returns `false` if the slot is not a memref slot.
    pub fn set_memref_size(&mut self, index: usize, new_size: usize) -> bool {
        match self.slots.get_mut(index) {
            Some(Param::Memref { size, .. }) => {
                *size = new_size;
                true
            }
            _ => false,
        }
    }

    /// Borrow the buffer behind a memref slot.
    ///
    /// # Safety
    /// The transport must have mapped `buffer..buffer + size` into the TA
    /// for the duration of the call, and nothing else may alias it.
    pub unsafe fn memref_mut(&mut self, index: usize) -> Option<&mut [u8]> {
        match self.slots.get(index)? {
            Param::Memref { buffer, size } if !buffer.is_null() => {
                Some(unsafe { core::slice::from_raw_parts_mut(*buffer, *size) })
            }
            _ => None,
        }
    }
}

/// `__utee_to_param`: build the TA view of a call's parameters.
///
/// A missing block yields four `NONE` slots.
pub fn decode(up: Option<&UteeParams>) -> Result<Params, EntryError> {
    let Some(up) = up else {
        return Ok(Params::empty());
    };

    let mut types = [ParamType::None; TEE_NUM_PARAMS];
    let mut slots = [Param::None; TEE_NUM_PARAMS];
    for index in 0..TEE_NUM_PARAMS {
        let typ = up.slot_type(index)?;
        let a = up.vals[index * 2];
        let b = up.vals[index * 2 + 1];
        slots[index] = if typ.is_value() {
            Param::Value {
                a: u32::try_from(a).map_err(|_| EntryError::BadParameters)?,
                b: u32::try_from(b).map_err(|_| EntryError::BadParameters)?,
            }
        } else if typ.is_memref() {
            let addr = usize::try_from(a).map_err(|_| EntryError::BadParameters)?;
            Param::Memref {
                buffer: core::ptr::with_exposed_provenance_mut(addr),
                size: usize::try_from(b).map_err(|_| EntryError::BadParameters)?,
            }
        } else {
            Param::None
        };
        types[index] = typ;
    }

    Ok(Params {
        types: ParamTypes::new(types),
        slots,
    })
}

/// `__utee_from_param`: copy TA results back into the caller's block.
///
/// Only output-capable slots are written: both words of an output value
/// slot, the size word of an output memref slot.
pub fn encode(params: &Params, up: &mut UteeParams) {
    for (index, slot) in params.slots.iter().enumerate() {
        let Some(typ) = params.types.get(index) else {
            continue;
        };
        if !typ.is_output() {
            continue;
        }
        match (typ.is_value(), slot) {
            (true, Param::Value { a, b }) => {
                up.vals[index * 2] = u64::from(*a);
                up.vals[index * 2 + 1] = u64::from(*b);
            }
            (false, Param::Memref { size, .. }) => {
                up.vals[index * 2 + 1] = *size as u64;
            }
            _ => {}
        }
    }
}
