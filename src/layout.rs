//! Array layout and formula rendering for code generation.
//!
//! The generated simulation program keeps the state variables in a state
//! vector handed to the ODE integrator, and all variables in a result
//! array.  `layout_arrays` assigns those indices:
//!
//! - state vector: `0..S-1` over the state variables, in declaration order;
//! - result array: `0..T-1` over all variables, the state variables first
//!   with the same indices as in the state vector, the algebraic variables
//!   after them in declaration order.
//!
//! `render_formula` converts a reverse Polish `Formula` into an infix
//! expression of the target language, given a function that maps paths to
//! target names.  It is pure; an ill-formed RPN sequence is an internal
//! diagnostic (a compiler bug, not a user error), never a silently wrong
//! expression.

use crate::diag::Diagnostic;
use crate::formula::Atom;
use crate::formula::Formula;
use crate::formula::MathOp;
use crate::model::Model;
use crate::path::Path;
use crate::util::new_map;
use crate::util::HashMap;

/// Index assignment for the state vector and the result array of one flat
/// process.
#[derive(Debug, Default)]
pub struct Layout {
    /// State vector index of each state variable.
    pub state_index: HashMap<Path, usize>,
    /// Result array index of every variable.
    pub result_index: HashMap<Path, usize>,
    /// Number of state variables, `S`.
    pub state_count: usize,
    /// Number of variables altogether, `T`.
    pub result_count: usize,
}

/// Assigns state vector and result array indices for a flat model.
pub fn layout_arrays(flat: &Model) -> Layout {
    let mut layout = Layout {
        state_index: new_map(),
        result_index: new_map(),
        state_count: 0,
        result_count: 0,
    };

    // state variables first; same index in both arrays
    let mut index = 0;
    for variable in flat.variables.iter().filter(|v| v.is_state_variable) {
        layout.state_index.insert(variable.name.clone(), index);
        layout.result_index.insert(variable.name.clone(), index);
        index += 1;
    }
    layout.state_count = index;

    // the algebraic variables come after the state variables in the
    // result array
    for variable in flat.variables.iter().filter(|v| !v.is_state_variable) {
        layout.result_index.insert(variable.name.clone(), index);
        index += 1;
    }
    layout.result_count = index;

    layout
}

/// Renders a formula as an infix expression of the target language.
///
/// `name` supplies the target spelling of every accessed path.  Rendering
/// rules: numbers keep their source lexeme; a binary operator puts one
/// space on each side, except `^` which becomes the target's `**` operator;
/// a unary sign is prefix with no space; a bracket atom wraps the operand
/// that follows it in literal parentheses.
pub fn render_formula(
    formula: &Formula,
    name: &dyn Fn(&Path) -> String,
) -> Result<String, Diagnostic> {
    let mut walker = Walker {
        atoms: formula.atoms(),
        pos: formula.len(),
        name,
    };
    let rendered = walker.render_operand()?;
    if walker.pos != 0 {
        return Err(Diagnostic::error_nospan(format!(
            "Internal compiler error: malformed formula, {} unconsumed items in: {}",
            walker.pos, formula
        )));
    }
    Ok(rendered)
}

/// Walks the RPN sequence from the end towards the start; the last atom is
/// the outermost operation, its operands are found by recursing.
struct Walker<'a> {
    atoms: &'a [Atom],
    pos: usize,
    name: &'a dyn Fn(&Path) -> String,
}

impl<'a> Walker<'a> {
    fn render_operand(&mut self) -> Result<String, Diagnostic> {
        if self.pos == 0 {
            return Err(Diagnostic::error_nospan(
                "Internal compiler error: malformed formula, end of sequence reached",
            ));
        }
        self.pos -= 1;
        match &self.atoms[self.pos] {
            Atom::Number(lexeme) => Ok(lexeme.clone()),
            Atom::Access(access) => Ok((self.name)(&access.path)),
            Atom::Bracket => {
                let inner = self.render_operand()?;
                Ok(format!("({})", inner))
            }
            Atom::Operator { op, arity: 1 } => {
                let operand = self.render_operand()?;
                Ok(format!("{}{}", op.symbol(), operand))
            }
            Atom::Operator { op, arity: 2 } => {
                // operands pop in reverse order
                let rhs = self.render_operand()?;
                let lhs = self.render_operand()?;
                match op {
                    MathOp::Pow => Ok(format!("{}**{}", lhs, rhs)),
                    _ => Ok(format!("{} {} {}", lhs, op.symbol(), rhs)),
                }
            }
            Atom::Operator { op, arity } => Err(Diagnostic::error_nospan(format!(
                "Internal compiler error: operator {} with {} operands",
                op, arity
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::MathOp;
    use crate::path::MemoryAccess;

    fn plain_name(path: &Path) -> String {
        path.to_string_sep("_")
    }

    #[test]
    fn renders_binary_chain() {
        // 2 * x + 1  ==  2 x * 1 +
        let mut f = Formula::new();
        f.push_number("2");
        f.push_access(MemoryAccess::plain(Path::from("x")));
        f.push_operator(MathOp::Mul, 2);
        f.push_number("1");
        f.push_operator(MathOp::Add, 2);
        let out = render_formula(&f, &plain_name).unwrap();
        assert_eq!(out, "2 * x + 1");
    }

    #[test]
    fn renders_unary_sign_without_space() {
        // -k * x  ==  k - x *
        let mut f = Formula::new();
        f.push_access(MemoryAccess::plain(Path::from("k")));
        f.push_operator(MathOp::Sub, 1);
        f.push_access(MemoryAccess::plain(Path::from("x")));
        f.push_operator(MathOp::Mul, 2);
        let name = |path: &Path| match path.to_string().as_str() {
            "k" => "self.k".to_string(),
            other => format!("v_{}", other),
        };
        let out = render_formula(&f, &name).unwrap();
        assert_eq!(out, "-self.k * v_x");
    }

    #[test]
    fn renders_brackets_and_pow() {
        // (a + b) ^ 2  ==  a b + () 2 ^
        let mut f = Formula::new();
        f.push_access(MemoryAccess::plain(Path::from("a")));
        f.push_access(MemoryAccess::plain(Path::from("b")));
        f.push_operator(MathOp::Add, 2);
        f.push_bracket();
        f.push_number("2");
        f.push_operator(MathOp::Pow, 2);
        let out = render_formula(&f, &plain_name).unwrap();
        assert_eq!(out, "(a + b)**2");
    }

    #[test]
    fn underflow_is_an_internal_error() {
        let mut f = Formula::new();
        f.push_operator(MathOp::Add, 2);
        assert!(render_formula(&f, &plain_name).is_err());
        assert!(render_formula(&Formula::new(), &plain_name).is_err());
    }

    #[test]
    fn leftover_atoms_are_an_internal_error() {
        let mut f = Formula::new();
        f.push_number("1");
        f.push_number("2");
        assert!(render_formula(&f, &plain_name).is_err());
    }
}
