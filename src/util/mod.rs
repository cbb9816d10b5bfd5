//! Small utility structures shared by the analyses

mod bit_set;

pub use bit_set::*;

/// Elements with a logical "width" (eg. the number of frame slots they occupy)
///
/// Values of type `long` or `double` take up two slots in the locals and on
/// the operand stack; everything else takes one.
pub trait Width {
    fn width(&self) -> usize;
}
