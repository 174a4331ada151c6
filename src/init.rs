/// Provides a constant initial value, so that a type can be placed in a
/// `static` without a runtime constructor.
pub trait Init {
    /// `Self`'s initial value.
    const INIT: Self;
}
