//! DWARF location expression simplification and evaluation.
//!
//! Location expressions come out of the reader as decoded operator tuples,
//! not raw bytes. Compilers emit a lot of redundancy (`DW_OP_deref;
//! DW_OP_stack_value` pairs, no-op arithmetic on literal zero, single-piece
//! compositions, scaling by literal one), so expressions are simplified
//! before evaluation; many simplify down to a bare `DW_OP_addr`, which is
//! all a static-memory debugger needs.

use std::fmt;

use gimli::constants as gim_con;
use gimli::DwOp;

use crate::error::Error;

/// One decoded location operator with up to three operands. Unused operand
/// slots are zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LocOp {
    pub op: DwOp,
    pub arg0: u64,
    pub arg1: u64,
    pub arg2: u64,
}

impl LocOp {
    pub fn new(op: DwOp) -> Self {
        Self { op, arg0: 0, arg1: 0, arg2: 0 }
    }

    pub fn with_arg(op: DwOp, arg0: u64) -> Self {
        Self { op, arg0, arg1: 0, arg2: 0 }
    }
}

impl fmt::Display for LocOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:#x}", self.op, self.arg0)
    }
}

/// Decodes an unsigned LEB128 value whose encoded bytes have been packed
/// little-endian into a single word, as the raw reader hands them over.
pub fn leb_udecode(mut encoded: u64) -> u64 {
    let mut value = encoded & 0x7f;
    let mut shift = 0;
    while encoded & 0x80 != 0 {
        encoded >>= 8;
        shift += 7;
        value |= (encoded & 0x7f) << shift;
    }
    value
}

fn is_literal(op: DwOp) -> bool {
    op.0 >= gim_con::DW_OP_lit0.0 && op.0 <= gim_con::DW_OP_lit31.0
}

fn is_identity_pair(a: &LocOp, b: &LocOp) -> bool {
    // A dereferenced value immediately re-registered as a stack value.
    if a.op == gim_con::DW_OP_deref && b.op == gim_con::DW_OP_stack_value {
        return true;
    }
    // Arithmetic with literal zero that cannot change the other operand.
    if a.op == gim_con::DW_OP_lit0
        && (b.op == gim_con::DW_OP_plus
            || b.op == gim_con::DW_OP_minus
            || b.op == gim_con::DW_OP_shl
            || b.op == gim_con::DW_OP_shr)
    {
        return true;
    }
    // Scaling by literal one, which LLVM emits around dereferences.
    if a.op == gim_con::DW_OP_lit1
        && (b.op == gim_con::DW_OP_mul || b.op == gim_con::DW_OP_div)
    {
        return true;
    }
    false
}

/// Rewrites an expression into an equivalent shorter one:
/// identity-operation removal (to fixpoint), merging of consecutive
/// `DW_OP_piece`s, and collapsing a contiguous chain of
/// `DW_OP_addr`/`DW_OP_piece` pairs into the single leading address.
pub fn simplify(ops: &[LocOp]) -> Vec<LocOp> {
    let mut ops = ops.to_vec();
    loop {
        let mut changed = false;
        let mut i = 0;
        while i < ops.len() {
            if i + 1 < ops.len() && is_identity_pair(&ops[i], &ops[i + 1]) {
                ops.drain(i..i + 2);
                changed = true;
                continue;
            }
            i += 1;
        }
        if !changed {
            break;
        }
    }

    // Consecutive pieces describe adjacent fragments of one composite.
    let mut merged: Vec<LocOp> = Vec::with_capacity(ops.len());
    for op in ops {
        if op.op == gim_con::DW_OP_piece {
            if let Some(last) = merged.last_mut() {
                if last.op == gim_con::DW_OP_piece {
                    last.arg0 += op.arg0;
                    continue;
                }
            }
        }
        merged.push(op);
    }

    // addr/piece, addr/piece, ... where each address continues exactly
    // where the previous piece ended is just the first address.
    if merged.len() >= 2
        && merged.len() % 2 == 0
        && merged[0].op == gim_con::DW_OP_addr
        && merged[1].op == gim_con::DW_OP_piece
    {
        let mut next_addr = merged[0].arg0.wrapping_add(merged[1].arg0);
        let mut contiguous = true;
        for pair in merged[2..].chunks(2) {
            if pair[0].op == gim_con::DW_OP_addr
                && pair[1].op == gim_con::DW_OP_piece
                && pair[0].arg0 == next_addr
            {
                next_addr = pair[0].arg0.wrapping_add(pair[1].arg0);
            } else {
                contiguous = false;
                break;
            }
        }
        if contiguous {
            return vec![merged[0]];
        }
    }
    merged
}

enum StepFault {
    Unsupported,
    Underflow,
    BadOperand,
}

/// Evaluates an expression that needs no machine state. Returns `Ok(None)`
/// when the simplified expression is empty (symbol optimized away or
/// register-resident), `Ok(Some(addr))` for a computable address, and an
/// error when an operator is unsupported or the sequence is malformed.
pub fn evaluate(ops: &[LocOp]) -> Result<Option<u64>, Error> {
    let simplified = simplify(ops);
    let mut stack: Vec<u64> = Vec::new();
    for op in &simplified {
        step(&mut stack, op).map_err(|fault| match fault {
            StepFault::Unsupported => Error::UnsupportedLocationOperator {
                op: op.op,
                expr: ops.to_vec(),
            },
            StepFault::Underflow | StepFault::BadOperand => {
                Error::MalformedLocationExpression { expr: ops.to_vec() }
            }
        })?;
    }
    Ok(stack.last().copied())
}

fn step(stack: &mut Vec<u64>, op: &LocOp) -> Result<(), StepFault> {
    fn pop(stack: &mut Vec<u64>) -> Result<u64, StepFault> {
        stack.pop().ok_or(StepFault::Underflow)
    }
    fn binary(
        stack: &mut Vec<u64>,
        f: impl FnOnce(u64, u64) -> Result<u64, StepFault>,
    ) -> Result<(), StepFault> {
        let a = pop(stack)?;
        let b = pop(stack)?;
        stack.push(f(b, a)?);
        Ok(())
    }

    let code = op.op;
    if is_literal(code) {
        stack.push((code.0 - gim_con::DW_OP_lit0.0) as u64);
        return Ok(());
    }
    match code {
        gim_con::DW_OP_addr => stack.push(op.arg0),
        gim_con::DW_OP_const1u | gim_con::DW_OP_const2u | gim_con::DW_OP_const4u | gim_con::DW_OP_const8u => {
            stack.push(op.arg0)
        }
        gim_con::DW_OP_constu => stack.push(leb_udecode(op.arg0)),
        gim_con::DW_OP_plus_uconst => {
            let v = pop(stack)?;
            stack.push(v.wrapping_add(leb_udecode(op.arg0)));
        }
        gim_con::DW_OP_plus => binary(stack, |b, a| Ok(b.wrapping_add(a)))?,
        gim_con::DW_OP_minus => binary(stack, |b, a| Ok(b.wrapping_sub(a)))?,
        gim_con::DW_OP_mul => binary(stack, |b, a| Ok(b.wrapping_mul(a)))?,
        gim_con::DW_OP_div => binary(stack, |b, a| {
            b.checked_div(a).ok_or(StepFault::BadOperand)
        })?,
        gim_con::DW_OP_mod => binary(stack, |b, a| {
            b.checked_rem(a).ok_or(StepFault::BadOperand)
        })?,
        gim_con::DW_OP_and => binary(stack, |b, a| Ok(b & a))?,
        gim_con::DW_OP_or => binary(stack, |b, a| Ok(b | a))?,
        gim_con::DW_OP_xor => binary(stack, |b, a| Ok(b ^ a))?,
        gim_con::DW_OP_shl => binary(stack, |b, a| Ok(b.wrapping_shl(a as u32)))?,
        gim_con::DW_OP_shr => binary(stack, |b, a| Ok(b.wrapping_shr(a as u32)))?,
        gim_con::DW_OP_abs => {
            let v = pop(stack)?;
            stack.push((v as i64).unsigned_abs());
        }
        gim_con::DW_OP_not => {
            let v = pop(stack)?;
            stack.push(!v);
        }
        gim_con::DW_OP_dup => {
            let v = *stack.last().ok_or(StepFault::Underflow)?;
            stack.push(v);
        }
        gim_con::DW_OP_drop => {
            pop(stack)?;
        }
        gim_con::DW_OP_pick => {
            let i = op.arg0 as usize;
            if i >= stack.len() {
                return Err(StepFault::Underflow);
            }
            let v = stack[stack.len() - 1 - i];
            stack.push(v);
        }
        gim_con::DW_OP_over => {
            if stack.len() < 2 {
                return Err(StepFault::Underflow);
            }
            let v = stack[stack.len() - 2];
            stack.push(v);
        }
        gim_con::DW_OP_swap => {
            let a = pop(stack)?;
            let b = pop(stack)?;
            stack.push(a);
            stack.push(b);
        }
        gim_con::DW_OP_rot => {
            let a = pop(stack)?;
            let b = pop(stack)?;
            let c = pop(stack)?;
            stack.push(a);
            stack.push(c);
            stack.push(b);
        }
        gim_con::DW_OP_nop => {}
        // Registers, frame bases, derefs and composition need machine
        // state this evaluator does not have.
        _ => return Err(StepFault::Unsupported),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op(code: DwOp) -> LocOp {
        LocOp::new(code)
    }

    fn arg(code: DwOp, a: u64) -> LocOp {
        LocOp::with_arg(code, a)
    }

    #[test]
    fn packed_leb_decoding() {
        assert_eq!(leb_udecode(0x00), 0);
        assert_eq!(leb_udecode(0x7f), 0x7f);
        // 0xe5 0x8e 0x26 little-endian packed = 624485.
        assert_eq!(leb_udecode(0x268ee5), 624485);
    }

    #[test]
    fn deref_stack_value_pair_is_removed() {
        let expr = [
            arg(gim_con::DW_OP_addr, 0x4000),
            op(gim_con::DW_OP_deref),
            op(gim_con::DW_OP_stack_value),
        ];
        assert_eq!(simplify(&expr), vec![arg(gim_con::DW_OP_addr, 0x4000)]);
        assert_eq!(evaluate(&expr).unwrap(), Some(0x4000));
    }

    #[test]
    fn literal_zero_arithmetic_is_removed() {
        let expr = [
            arg(gim_con::DW_OP_addr, 0x100),
            op(gim_con::DW_OP_lit0),
            op(gim_con::DW_OP_plus),
        ];
        assert_eq!(simplify(&expr), vec![arg(gim_con::DW_OP_addr, 0x100)]);
    }

    #[test]
    fn literal_one_scaling_is_removed() {
        let expr = [op(gim_con::DW_OP_lit1), op(gim_con::DW_OP_mul)];
        assert_eq!(simplify(&expr), Vec::<LocOp>::new());
        let expr = [op(gim_con::DW_OP_lit1), op(gim_con::DW_OP_div)];
        assert_eq!(simplify(&expr), Vec::<LocOp>::new());
    }

    #[test]
    fn scaled_dereference_reduces_to_its_address() {
        // LLVM wraps a plain static address in a dereference scaled by one
        // and offset by zero; the whole thing means the address itself.
        let expr = [
            arg(gim_con::DW_OP_addr, 0xc4d0),
            op(gim_con::DW_OP_deref),
            op(gim_con::DW_OP_lit1),
            op(gim_con::DW_OP_mul),
            op(gim_con::DW_OP_lit0),
            op(gim_con::DW_OP_plus),
            op(gim_con::DW_OP_stack_value),
        ];
        assert_eq!(simplify(&expr), vec![arg(gim_con::DW_OP_addr, 0xc4d0)]);
        assert_eq!(evaluate(&expr).unwrap(), Some(0xc4d0));
    }

    #[test]
    fn consecutive_pieces_merge() {
        let expr = [
            op(gim_con::DW_OP_reg0),
            arg(gim_con::DW_OP_piece, 4),
            arg(gim_con::DW_OP_piece, 4),
        ];
        let s = simplify(&expr);
        assert_eq!(s.len(), 2);
        assert_eq!(s[1], arg(gim_con::DW_OP_piece, 8));
    }

    #[test]
    fn contiguous_addr_piece_chain_collapses() {
        let expr = [
            arg(gim_con::DW_OP_addr, 0x1000),
            arg(gim_con::DW_OP_piece, 4),
            arg(gim_con::DW_OP_addr, 0x1004),
            arg(gim_con::DW_OP_piece, 4),
        ];
        assert_eq!(simplify(&expr), vec![arg(gim_con::DW_OP_addr, 0x1000)]);
        assert_eq!(evaluate(&expr).unwrap(), Some(0x1000));
    }

    #[test]
    fn discontiguous_chain_does_not_collapse() {
        let expr = [
            arg(gim_con::DW_OP_addr, 0x1000),
            arg(gim_con::DW_OP_piece, 4),
            arg(gim_con::DW_OP_addr, 0x2000),
            arg(gim_con::DW_OP_piece, 4),
        ];
        assert_eq!(simplify(&expr).len(), 4);
    }

    #[test]
    fn simple_arithmetic_evaluates() {
        let expr = [
            arg(gim_con::DW_OP_addr, 0x1000),
            arg(gim_con::DW_OP_constu, 0x10),
            op(gim_con::DW_OP_plus),
        ];
        assert_eq!(evaluate(&expr).unwrap(), Some(0x1010));

        let expr = [op(gim_con::DW_OP_lit5), op(gim_con::DW_OP_lit3), op(gim_con::DW_OP_minus)];
        assert_eq!(evaluate(&expr).unwrap(), Some(2));
    }

    #[test]
    fn plus_uconst_decodes_packed_leb() {
        let expr = [
            arg(gim_con::DW_OP_addr, 0x1000),
            // 0x80 0x02 packed little-endian encodes 256.
            arg(gim_con::DW_OP_plus_uconst, 0x0280),
        ];
        assert_eq!(evaluate(&expr).unwrap(), Some(0x1100));
    }

    #[test]
    fn stack_shuffles() {
        let expr = [
            op(gim_con::DW_OP_lit1),
            op(gim_con::DW_OP_lit2),
            op(gim_con::DW_OP_swap),
        ];
        assert_eq!(evaluate(&expr).unwrap(), Some(1));

        let expr = [
            op(gim_con::DW_OP_lit1),
            op(gim_con::DW_OP_lit2),
            op(gim_con::DW_OP_lit3),
            op(gim_con::DW_OP_rot),
        ];
        // rot sends the top to third place; the second becomes the top.
        assert_eq!(evaluate(&expr).unwrap(), Some(2));

        let expr = [
            op(gim_con::DW_OP_lit7),
            op(gim_con::DW_OP_lit9),
            op(gim_con::DW_OP_over),
        ];
        assert_eq!(evaluate(&expr).unwrap(), Some(7));
    }

    #[test]
    fn empty_expression_has_no_address() {
        assert_eq!(evaluate(&[]).unwrap(), None);
        // An expression that simplifies to nothing behaves the same.
        let expr = [op(gim_con::DW_OP_deref), op(gim_con::DW_OP_stack_value)];
        assert_eq!(evaluate(&expr).unwrap(), None);
    }

    #[test]
    fn register_operators_are_unsupported() {
        let expr = [op(gim_con::DW_OP_reg3)];
        match evaluate(&expr) {
            Err(Error::UnsupportedLocationOperator { op: code, expr: orig }) => {
                assert_eq!(code, gim_con::DW_OP_reg3);
                assert_eq!(orig.len(), 1);
            }
            other => panic!("expected unsupported-operator error, got {other:?}"),
        }
    }

    #[test]
    fn underflow_is_malformed() {
        let expr = [op(gim_con::DW_OP_plus)];
        assert!(matches!(
            evaluate(&expr),
            Err(Error::MalformedLocationExpression { .. })
        ));
    }

    #[test]
    fn division_by_zero_is_malformed() {
        let expr = [op(gim_con::DW_OP_lit4), op(gim_con::DW_OP_lit0), op(gim_con::DW_OP_div)];
        assert!(matches!(
            evaluate(&expr),
            Err(Error::MalformedLocationExpression { .. })
        ));
    }
}
