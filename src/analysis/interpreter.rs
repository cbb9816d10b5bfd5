//! Abstract interpretation rules for instruction typing
//!
//! A fixed-point dataflow driver owns the actual iteration: it keeps a frame
//! of lattice values per basic block, replays instructions through the
//! transfer rules here, and calls [`TypeInterpreter::merge`] whenever two
//! control-flow paths converge on the same slot. The rules themselves are
//! pure functions of the instruction (and, for merges, of the registered
//! verification frames): no runtime values are ever involved.
//!
//! Transfer rules are grouped by how many operands the instruction pops,
//! matching the driver's dispatch. A rule returning `None` means the
//! instruction pushes nothing this lattice tracks (branches, stores, `put*`,
//! the value-free comparisons), and the driver skips recording a value for
//! it. An instruction reaching a rule that has no typing for it is a
//! malformed body and fails the analysis.

use super::{Error, FrameTable, TypeValue};
use crate::jvm::{Constant, FieldType, Insn, RefType};

/// Which frame slot a merge is reconciling
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FrameSlot {
    /// Local variable at the given index
    Local(usize),

    /// Operand stack slot at the given depth (0 = bottom of the stack)
    Stack(usize),
}

/// Program point and slot of the merge currently being computed
///
/// Passed explicitly into every [`TypeInterpreter::merge`] call so the
/// positional context a divergent-reference merge needs is part of the
/// signature rather than implicit interpreter state.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct MergeTarget {
    /// Sequence index of the instruction where the paths converge
    pub insn_index: usize,

    pub slot: FrameSlot,
}

/// Per-instruction type-transfer rules and the lattice merge operator
pub struct TypeInterpreter {
    frames: FrameTable,
}

impl TypeInterpreter {
    pub fn new(frames: FrameTable) -> TypeInterpreter {
        TypeInterpreter { frames }
    }

    /// Type pushed by an instruction that pops nothing
    pub fn new_operation(&self, insn: &Insn) -> Result<TypeValue, Error> {
        Ok(match insn {
            Insn::AConstNull => TypeValue::Null,
            Insn::IConst(_) => TypeValue::Int,
            Insn::BiPush(_) => TypeValue::Byte,
            Insn::SiPush(_) => TypeValue::Short,
            Insn::LConst(_) => TypeValue::Long,
            Insn::FConst(_) => TypeValue::Float,
            Insn::DConst(_) => TypeValue::Double,
            Insn::Ldc(constant) => constant_type(constant),
            Insn::GetStatic(field) => TypeValue::of(&field.descriptor),
            Insn::New(class) => TypeValue::Reference(RefType::Object(class.clone())),
            _ => return Err(unsupported("new", insn)),
        })
    }

    /// Type of a value moved verbatim (loads, stores, `dup` family, `swap`)
    pub fn copy_operation(&self, _insn: &Insn, value: TypeValue) -> TypeValue {
        value
    }

    /// Type pushed by an instruction that pops one operand
    pub fn unary_operation(&self, insn: &Insn, _value: &TypeValue) -> Result<Option<TypeValue>, Error> {
        Ok(match insn {
            Insn::INeg
            | Insn::L2I
            | Insn::F2I
            | Insn::D2I
            | Insn::ArrayLength
            | Insn::IInc(..) => Some(TypeValue::Int),
            Insn::InstanceOf(_) => Some(TypeValue::Boolean),
            Insn::I2B => Some(TypeValue::Byte),
            Insn::I2C => Some(TypeValue::Char),
            Insn::I2S => Some(TypeValue::Short),
            Insn::FNeg | Insn::I2F | Insn::L2F | Insn::D2F => Some(TypeValue::Float),
            Insn::LNeg | Insn::I2L | Insn::F2L | Insn::D2L => Some(TypeValue::Long),
            Insn::DNeg | Insn::I2D | Insn::L2D | Insn::F2D => Some(TypeValue::Double),
            Insn::GetField(field) => Some(TypeValue::of(&field.descriptor)),
            Insn::NewArray(element) => Some(TypeValue::Reference(RefType::array(
                FieldType::Base(*element),
            ))),
            Insn::ANewArray(component) => Some(TypeValue::Reference(RefType::array(
                FieldType::Ref(component.clone()),
            ))),
            Insn::CheckCast(target) => Some(TypeValue::Reference(target.clone())),
            Insn::If(..)
            | Insn::IfNull(..)
            | Insn::TableSwitch { .. }
            | Insn::LookupSwitch { .. }
            | Insn::IReturn
            | Insn::LReturn
            | Insn::FReturn
            | Insn::DReturn
            | Insn::AReturn
            | Insn::PutStatic(_)
            | Insn::AThrow
            | Insn::MonitorEnter
            | Insn::MonitorExit => None,
            _ => return Err(unsupported("unary", insn)),
        })
    }

    /// Type pushed by an instruction that pops two operands
    ///
    /// `value1` is the deeper of the two (for an array-element load, the
    /// array itself).
    pub fn binary_operation(
        &self,
        insn: &Insn,
        value1: &TypeValue,
        _value2: &TypeValue,
    ) -> Result<Option<TypeValue>, Error> {
        Ok(match insn {
            // the array operand decides the loaded type: `baload` loads from
            // both `byte[]` and `boolean[]`, `aaload` from any reference array
            Insn::IALoad | Insn::AALoad | Insn::BALoad | Insn::CALoad | Insn::SALoad => {
                Some(element_type(value1)?)
            }
            Insn::FALoad => Some(TypeValue::Float),
            Insn::LALoad => Some(TypeValue::Long),
            Insn::DALoad => Some(TypeValue::Double),
            Insn::IAdd
            | Insn::ISub
            | Insn::IMul
            | Insn::IDiv
            | Insn::IRem
            | Insn::ISh(_)
            | Insn::IAnd
            | Insn::IOr
            | Insn::IXor
            | Insn::LCmp
            | Insn::FCmp(_)
            | Insn::DCmp(_) => Some(TypeValue::Int),
            Insn::FAdd | Insn::FSub | Insn::FMul | Insn::FDiv | Insn::FRem => {
                Some(TypeValue::Float)
            }
            Insn::LAdd
            | Insn::LSub
            | Insn::LMul
            | Insn::LDiv
            | Insn::LRem
            | Insn::LSh(_)
            | Insn::LAnd
            | Insn::LOr
            | Insn::LXor => Some(TypeValue::Long),
            Insn::DAdd | Insn::DSub | Insn::DMul | Insn::DDiv | Insn::DRem => {
                Some(TypeValue::Double)
            }
            Insn::IfICmp(..) | Insn::IfACmp(..) | Insn::PutField(_) => None,
            _ => return Err(unsupported("binary", insn)),
        })
    }

    /// Type pushed by an instruction that pops three operands
    ///
    /// Only the array-element stores get here, and they push nothing.
    pub fn ternary_operation(
        &self,
        _insn: &Insn,
        _value1: &TypeValue,
        _value2: &TypeValue,
        _value3: &TypeValue,
    ) -> Option<TypeValue> {
        None
    }

    /// Type pushed by an instruction with a variable operand count
    pub fn nary_operation(
        &self,
        insn: &Insn,
        _values: &[TypeValue],
    ) -> Result<Option<TypeValue>, Error> {
        Ok(match insn {
            Insn::MultiANewArray(array_type, _) => {
                Some(TypeValue::Reference(array_type.clone()))
            }
            Insn::Invoke(_, method) => method.descriptor.return_type.as_ref().map(TypeValue::of),
            Insn::InvokeDynamic(call_site) => {
                call_site.descriptor.return_type.as_ref().map(TypeValue::of)
            }
            _ => return Err(unsupported("nary", insn)),
        })
    }

    /// Join two lattice values flowing into the same slot from converging
    /// control-flow paths
    ///
    /// The interesting case is a divergence between unrelated reference
    /// kinds: neither operand is a safe answer, so the verifier's own frame
    /// at the merge point is consulted for the declared slot type. A frame
    /// that exists but does not cover the slot yields [`TypeValue::Unknown`];
    /// a point with no frame at all keeps the incoming `value2`, an
    /// intentionally imprecise fallback consumers must tolerate.
    pub fn merge(&self, value1: &TypeValue, value2: &TypeValue, target: MergeTarget) -> TypeValue {
        if *value1 == TypeValue::Unknown || *value2 == TypeValue::Unknown {
            return TypeValue::Unknown;
        }
        if value1 == value2 {
            return value1.clone();
        }
        if *value2 == TypeValue::Null {
            return value1.clone();
        }
        if *value1 == TypeValue::Null {
            return value2.clone();
        }
        if value1.is_int_kind() && value2.is_int_kind() {
            return TypeValue::Int;
        }

        match self.frames.get(target.insn_index) {
            Some(frame) => {
                let declared = match target.slot {
                    FrameSlot::Local(index) => frame.locals.get(index),
                    FrameSlot::Stack(index) => frame.stack.get(index),
                };
                declared.cloned().unwrap_or(TypeValue::Unknown)
            }
            None => value2.clone(),
        }
    }
}

fn unsupported(rule: &'static str, insn: &Insn) -> Error {
    Error::UnsupportedInstruction {
        rule,
        instruction: format!("{:?}", insn),
    }
}

fn constant_type(constant: &Constant) -> TypeValue {
    match constant {
        Constant::Integer(_) => TypeValue::Int,
        Constant::Float(_) => TypeValue::Float,
        Constant::Long(_) => TypeValue::Long,
        Constant::Double(_) => TypeValue::Double,
        Constant::String(_) => TypeValue::Reference(RefType::STRING),
        Constant::Class(_) => TypeValue::Reference(RefType::CLASS),
        Constant::MethodType(_) => TypeValue::Reference(RefType::METHODTYPE),
        Constant::MethodHandle(_) => TypeValue::Reference(RefType::METHODHANDLE),
        Constant::Dynamic { descriptor, .. } => TypeValue::of(descriptor),
    }
}

fn element_type(array: &TypeValue) -> Result<TypeValue, Error> {
    if let TypeValue::Reference(ref_type) = array {
        if let Some(element) = ref_type.element_type() {
            return Ok(TypeValue::of(&element));
        }
    }
    Err(Error::NotArrayType(array.clone()))
}
