/// Primitive value kinds. Numeric ranks order the promotion lattice.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Prim {
    Boolean,
    Int,
    Long,
    Float,
    Double,
}

impl Prim {
    pub const ALL: [Prim; 5] = [Prim::Boolean, Prim::Int, Prim::Long, Prim::Float, Prim::Double];

    /// Position in `int < long < float < double`; `None` for boolean.
    pub fn rank(self) -> Option<u8> {
        match self {
            Prim::Boolean => None,
            Prim::Int => Some(0),
            Prim::Long => Some(1),
            Prim::Float => Some(2),
            Prim::Double => Some(3),
        }
    }

    pub fn is_numeric(self) -> bool {
        self.rank().is_some()
    }

    pub fn is_integral(self) -> bool {
        matches!(self, Prim::Int | Prim::Long)
    }

    /// Lossless-by-convention widening (`int -> long -> float -> double`).
    pub fn widens_to(self, target: Prim) -> bool {
        match (self.rank(), target.rank()) {
            (Some(a), Some(b)) => a < b,
            _ => false,
        }
    }

    /// Result kind of a binary arithmetic op on `self` and `other`.
    pub fn promote(self, other: Prim) -> Option<Prim> {
        match (self.rank(), other.rank()) {
            (Some(a), Some(b)) => Some(if a >= b { self } else { other }),
            _ => None,
        }
    }

    pub fn primitive_name(self) -> &'static str {
        match self {
            Prim::Boolean => "boolean",
            Prim::Int => "int",
            Prim::Long => "long",
            Prim::Float => "float",
            Prim::Double => "double",
        }
    }

    pub fn boxed_name(self) -> &'static str {
        match self {
            Prim::Boolean => "Boolean",
            Prim::Int => "Integer",
            Prim::Long => "Long",
            Prim::Float => "Float",
            Prim::Double => "Double",
        }
    }
}
