use super::number::Number;

/// Binary operator inside a calculation expression.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CalcOp {
    Plus,
    Minus,
    Times,
    Div,
}

impl CalcOp {
    pub fn symbol(self) -> &'static str {
        match self {
            CalcOp::Plus => "+",
            CalcOp::Minus => "-",
            CalcOp::Times => "*",
            CalcOp::Div => "/",
        }
    }
}

/// One argument of a calculation: a resolved number, an opaque css fragment
/// (`var(--x)` and friends), a pending operation, or a nested calculation.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum CalculationArg {
    Number(Number),
    /// Unquoted css text that must be preserved verbatim.
    Text(String),
    Operation {
        op: CalcOp,
        lhs: Box<CalculationArg>,
        rhs: Box<CalculationArg>,
    },
    Calculation(Calculation),
}

impl CalculationArg {
    /// Combine two arguments, folding into a plain number whenever both
    /// sides are numbers the operator can act on.
    pub fn operation(op: CalcOp, lhs: CalculationArg, rhs: CalculationArg) -> CalculationArg {
        if let (CalculationArg::Number(left), CalculationArg::Number(right)) = (&lhs, &rhs) {
            let folded = match op {
                CalcOp::Plus => left.add(right),
                CalcOp::Minus => left.subtract(right),
                CalcOp::Times => Some(left.multiply(right)),
                CalcOp::Div => Some(left.divide(right)),
            };
            if let Some(number) = folded {
                return CalculationArg::Number(number);
            }
        }
        CalculationArg::Operation {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }
}

/// A symbolic `calc()`-family expression that could not be resolved to a
/// number at evaluation time.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Calculation {
    pub name: String,
    pub args: Vec<CalculationArg>,
}

impl Calculation {
    pub fn new(name: impl Into<String>, args: Vec<CalculationArg>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }

    /// Reduce a calculation to a plain number when its arguments allow it:
    /// `calc()` of one number, `min()`/`max()` of compatible numbers, and
    /// `clamp()` of three compatible numbers.
    pub fn reduce(self) -> Result<Number, Calculation> {
        match self.name.as_str() {
            "calc" => match self.args.as_slice() {
                [CalculationArg::Number(number)] => Ok(number.clone()),
                _ => Err(self),
            },
            "min" | "max" => {
                let mut numbers = Vec::with_capacity(self.args.len());
                for arg in &self.args {
                    match arg {
                        CalculationArg::Number(number) => numbers.push(number.clone()),
                        _ => return Err(self),
                    }
                }
                let Some(mut best) = numbers.first().cloned() else {
                    return Err(self);
                };
                let want_less = self.name == "min";
                for candidate in &numbers[1..] {
                    let Some(ordering) = candidate.compare(&best) else {
                        return Err(self);
                    };
                    let is_better = if want_less {
                        ordering == std::cmp::Ordering::Less
                    } else {
                        ordering == std::cmp::Ordering::Greater
                    };
                    if is_better {
                        best = candidate.clone();
                    }
                }
                Ok(best)
            }
            "clamp" => match self.args.as_slice() {
                [CalculationArg::Number(min), CalculationArg::Number(value), CalculationArg::Number(max)] =>
                {
                    let (Some(low), Some(high)) =
                        (value.compare(min), value.compare(max))
                    else {
                        return Err(self);
                    };
                    Ok(if low == std::cmp::Ordering::Less {
                        min.clone()
                    } else if high == std::cmp::Ordering::Greater {
                        max.clone()
                    } else {
                        value.clone()
                    })
                }
                _ => Err(self),
            },
            _ => Err(self),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compatible_operations_fold_to_numbers() {
        let folded = CalculationArg::operation(
            CalcOp::Plus,
            CalculationArg::Number(Number::with_unit(1.0, "px")),
            CalculationArg::Number(Number::with_unit(2.0, "px")),
        );
        assert_eq!(folded, CalculationArg::Number(Number::with_unit(3.0, "px")));
    }

    #[test]
    fn incompatible_operations_stay_symbolic() {
        let symbolic = CalculationArg::operation(
            CalcOp::Plus,
            CalculationArg::Number(Number::with_unit(1.0, "px")),
            CalculationArg::Text("var(--gap)".into()),
        );
        assert!(matches!(symbolic, CalculationArg::Operation { .. }));
    }

    #[test]
    fn clamp_of_numbers_reduces() {
        let calc = Calculation::new(
            "clamp",
            vec![
                CalculationArg::Number(Number::with_unit(1.0, "px")),
                CalculationArg::Number(Number::with_unit(5.0, "px")),
                CalculationArg::Number(Number::with_unit(3.0, "px")),
            ],
        );
        let reduced = calc.reduce().expect("reducible");
        assert_eq!(reduced, Number::with_unit(3.0, "px"));
    }
}
