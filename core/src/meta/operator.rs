/// Operators that dispatch to named methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Plus,
    Minus,
    Multiply,
    Div,
    Mod,
    Power,
    LeftShift,
    RightShift,
    GetAt,
    PutAt,
    Compare,
    Equals,
    NotEquals,
    Less,
    LessEq,
    Greater,
    GreaterEq,
    And,
    Or,
    Xor,
    Negative,
    Positive,
    BitwiseNegate,
    Next,
    Previous,
}

impl Operator {
    /// Method the operator calls on its left operand.
    pub fn method_name(self) -> &'static str {
        match self {
            Operator::Plus => "plus",
            Operator::Minus => "minus",
            Operator::Multiply => "multiply",
            Operator::Div => "div",
            Operator::Mod => "mod",
            Operator::Power => "power",
            Operator::LeftShift => "leftShift",
            Operator::RightShift => "rightShift",
            Operator::GetAt => "getAt",
            Operator::PutAt => "putAt",
            Operator::Compare | Operator::Less | Operator::LessEq | Operator::Greater | Operator::GreaterEq => {
                "compareTo"
            }
            Operator::Equals | Operator::NotEquals => "equals",
            Operator::And => "and",
            Operator::Or => "or",
            Operator::Xor => "xor",
            Operator::Negative => "negative",
            Operator::Positive => "positive",
            Operator::BitwiseNegate => "bitwiseNegate",
            Operator::Next => "next",
            Operator::Previous => "previous",
        }
    }

    pub fn from_symbol(symbol: &str) -> Option<Operator> {
        Some(match symbol {
            "+" => Operator::Plus,
            "-" => Operator::Minus,
            "*" => Operator::Multiply,
            "/" => Operator::Div,
            "%" => Operator::Mod,
            "**" => Operator::Power,
            "<<" => Operator::LeftShift,
            ">>" => Operator::RightShift,
            "[]" => Operator::GetAt,
            "[]=" => Operator::PutAt,
            "<=>" => Operator::Compare,
            "==" => Operator::Equals,
            "!=" => Operator::NotEquals,
            "<" => Operator::Less,
            "<=" => Operator::LessEq,
            ">" => Operator::Greater,
            ">=" => Operator::GreaterEq,
            "&" => Operator::And,
            "|" => Operator::Or,
            "^" => Operator::Xor,
            "~" => Operator::BitwiseNegate,
            "++" => Operator::Next,
            "--" => Operator::Previous,
            _ => return None,
        })
    }

    /// Unary operators take no argument besides the receiver.
    pub fn is_unary(self) -> bool {
        matches!(
            self,
            Operator::Negative | Operator::Positive | Operator::BitwiseNegate | Operator::Next | Operator::Previous
        )
    }

    /// Operators whose result is derived from a `compareTo` result.
    pub fn is_relational(self) -> bool {
        matches!(self, Operator::Less | Operator::LessEq | Operator::Greater | Operator::GreaterEq)
    }

    /// Applies a relational operator to a `compareTo` result.
    pub fn from_ordering(self, cmp: i64) -> bool {
        match self {
            Operator::Less => cmp < 0,
            Operator::LessEq => cmp <= 0,
            Operator::Greater => cmp > 0,
            Operator::GreaterEq => cmp >= 0,
            _ => cmp == 0,
        }
    }
}
