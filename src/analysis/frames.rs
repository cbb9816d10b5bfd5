use super::{Error, TypeValue};
use crate::jvm::{BinaryName, ParseDescriptor, RefType};
use crate::util::Width;
use rustc_hash::FxHashMap;

/// One entry of a captured verification frame, in the host verifier's
/// compressed encoding
///
/// The encoding stores one entry per logical value: a 64-bit entry stands for
/// two slots, with the trailing padding slot left implicit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FrameEntry {
    Top,
    Integer,
    Float,
    Double,
    Long,
    Null,
    UninitializedThis,

    /// Internal class name (eg. `java/lang/String`), or a full array
    /// descriptor when the string starts with `[`
    Object(String),
}

impl FrameEntry {
    /// Decode this entry onto the end of a dense slot array
    ///
    /// 64-bit kinds expand to their value followed by an [`TypeValue::Unknown`]
    /// padding slot. Entry kinds with no lattice counterpart decode to
    /// [`TypeValue::Unknown`].
    fn decode_onto(&self, slots: &mut Vec<TypeValue>) -> Result<(), Error> {
        let value = match self {
            FrameEntry::Top | FrameEntry::UninitializedThis => TypeValue::Unknown,
            FrameEntry::Integer => TypeValue::Int,
            FrameEntry::Float => TypeValue::Float,
            FrameEntry::Double => TypeValue::Double,
            FrameEntry::Long => TypeValue::Long,
            FrameEntry::Null => TypeValue::Null,
            FrameEntry::Object(name) => TypeValue::Reference(parse_frame_reference(name)?),
        };
        let width = value.width();
        slots.push(value);
        if width == 2 {
            slots.push(TypeValue::Unknown);
        }
        Ok(())
    }
}

fn parse_frame_reference(name: &str) -> Result<RefType, Error> {
    if name.starts_with('[') {
        RefType::parse(name).map_err(|_| Error::BadDescriptor(String::from(name)))
    } else {
        BinaryName::from_string(String::from(name))
            .map(RefType::Object)
            .map_err(|_| Error::BadDescriptor(String::from(name)))
    }
}

/// Captured stack map frame, exactly as the host verifier emits it
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VerificationFrame {
    pub locals: Vec<FrameEntry>,
    pub stack: Vec<FrameEntry>,
}

/// Verification frame decoded into dense, randomly-indexable slot arrays
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    /// Local variable slots (64-bit values take two, the second `Unknown`)
    pub locals: Vec<TypeValue>,

    /// Operand stack slots, bottom of the stack first
    pub stack: Vec<TypeValue>,
}

impl Frame {
    fn decode(frame: &VerificationFrame) -> Result<Frame, Error> {
        let mut locals = Vec::with_capacity(frame.locals.len());
        for entry in &frame.locals {
            entry.decode_onto(&mut locals)?;
        }
        let mut stack = Vec::with_capacity(frame.stack.len());
        for entry in &frame.stack {
            entry.decode_onto(&mut stack)?;
        }
        Ok(Frame { locals, stack })
    }
}

/// Sparse table of verification frames keyed by instruction index
///
/// The host's verifier only annotates the program points it had to (jump
/// targets), so most points have no frame. Frames are decoded once, at
/// registration; slot queries during merges hit the decoded form directly.
#[derive(Debug, Default)]
pub struct FrameTable {
    frames: FxHashMap<usize, Frame>,
}

impl FrameTable {
    pub fn new() -> FrameTable {
        FrameTable {
            frames: FxHashMap::default(),
        }
    }

    /// Register the frame captured at an instruction index
    pub fn insert(&mut self, insn_index: usize, frame: &VerificationFrame) -> Result<(), Error> {
        self.frames.insert(insn_index, Frame::decode(frame)?);
        Ok(())
    }

    /// Decoded frame at an instruction index, if one was registered
    pub fn get(&self, insn_index: usize) -> Option<&Frame> {
        self.frames.get(&insn_index)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}
