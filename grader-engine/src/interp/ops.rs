use super::ast::{BinOp, CmpOp, UnaryOp};
use super::error::{Fault, Result};
use super::format::describe;
use super::object::{range_len, DictRef, ListRef, Object, MAX_DEPTH};

use std::cmp::Ordering;
use std::rc::Rc;

#[derive(Debug, Clone, Copy)]
enum Num {
    Int(i64),
    Float(f64),
}

fn num(obj: &Object) -> Option<Num> {
    match *obj {
        Object::Bool(b) => Some(Num::Int(b as i64)),
        Object::Int(n) => Some(Num::Int(n)),
        Object::Float(x) => Some(Num::Float(x)),
        _ => None,
    }
}

impl Num {
    fn as_f64(self) -> f64 {
        match self {
            Num::Int(n) => n as f64,
            Num::Float(x) => x,
        }
    }
}

pub fn py_eq(a: &Object, b: &Object) -> bool {
    eq_at(a, b, 0)
}

fn eq_at(a: &Object, b: &Object, depth: usize) -> bool {
    if depth > MAX_DEPTH {
        return false;
    }
    if let (Some(x), Some(y)) = (num(a), num(b)) {
        return match (x, y) {
            (Num::Int(x), Num::Int(y)) => x == y,
            (x, y) => x.as_f64() == y.as_f64(),
        };
    }
    match (a, b) {
        (Object::None, Object::None) => true,
        (Object::Str(x), Object::Str(y)) => x == y,
        (Object::List(x), Object::List(y)) => {
            Rc::ptr_eq(x, y) || seq_eq(&x.borrow(), &y.borrow(), depth)
        }
        (Object::Tuple(x), Object::Tuple(y)) => seq_eq(x, y, depth),
        (Object::Dict(x), Object::Dict(y)) => {
            if Rc::ptr_eq(x, y) {
                return true;
            }
            let (x, y) = (x.borrow(), y.borrow());
            x.len() == y.len()
                && x.iter().all(|(k, v)| {
                    y.iter()
                        .find(|(k2, _)| eq_at(k, k2, depth + 1))
                        .map_or(false, |(_, v2)| eq_at(v, v2, depth + 1))
                })
        }
        (Object::Range(..), Object::Range(..)) => range_eq(a, b),
        (Object::Function(x), Object::Function(y)) => Rc::ptr_eq(x, y),
        (Object::Builtin(x), Object::Builtin(y)) => x == y,
        (Object::Module(x), Object::Module(y)) => x == y,
        (Object::ExceptionType(x), Object::ExceptionType(y)) => x == y,
        (Object::Exception(x), Object::Exception(y)) => Rc::ptr_eq(x, y),
        _ => false,
    }
}

fn seq_eq(x: &[Object], y: &[Object], depth: usize) -> bool {
    x.len() == y.len() && x.iter().zip(y).all(|(p, q)| eq_at(p, q, depth + 1))
}

/// Ranges are equal when they produce the same items.
fn range_eq(a: &Object, b: &Object) -> bool {
    let (len_a, len_b) = (range_len(a), range_len(b));
    match (a, b) {
        (Object::Range(start_a, _, step_a), Object::Range(start_b, _, step_b)) => {
            len_a == len_b
                && (len_a == 0 || (start_a == start_b && (len_a == 1 || step_a == step_b)))
        }
        _ => false,
    }
}

pub fn is_same(a: &Object, b: &Object) -> bool {
    match (a, b) {
        (Object::None, Object::None) => true,
        (Object::Bool(x), Object::Bool(y)) => x == y,
        (Object::Int(x), Object::Int(y)) => x == y,
        (Object::Str(x), Object::Str(y)) => Rc::ptr_eq(x, y) || x == y,
        (Object::List(x), Object::List(y)) => Rc::ptr_eq(x, y),
        (Object::Dict(x), Object::Dict(y)) => Rc::ptr_eq(x, y),
        (Object::Tuple(x), Object::Tuple(y)) => Rc::ptr_eq(x, y),
        (Object::Function(x), Object::Function(y)) => Rc::ptr_eq(x, y),
        (Object::Exception(x), Object::Exception(y)) => Rc::ptr_eq(x, y),
        (Object::Builtin(x), Object::Builtin(y)) => x == y,
        (Object::ExceptionType(x), Object::ExceptionType(y)) => x == y,
        (Object::Module(x), Object::Module(y)) => x == y,
        _ => false,
    }
}

/// Total order used by `<` and by sorting.
pub fn py_cmp(a: &Object, b: &Object) -> Result<Ordering> {
    cmp_at(a, b, 0)
}

fn cmp_at(a: &Object, b: &Object, depth: usize) -> Result<Ordering> {
    if depth > MAX_DEPTH {
        return Err(Fault::raise("RecursionError", "maximum recursion depth exceeded in comparison"));
    }
    if let (Some(x), Some(y)) = (num(a), num(b)) {
        return Ok(match (x, y) {
            (Num::Int(x), Num::Int(y)) => x.cmp(&y),
            (x, y) => x.as_f64().partial_cmp(&y.as_f64()).unwrap_or(Ordering::Equal),
        });
    }
    match (a, b) {
        (Object::Str(x), Object::Str(y)) => Ok(x.cmp(y)),
        (Object::List(x), Object::List(y)) => seq_cmp(&x.borrow(), &y.borrow(), depth),
        (Object::Tuple(x), Object::Tuple(y)) => seq_cmp(x, y, depth),
        _ => Err(Fault::type_error(format!(
            "'<' not supported between instances of '{}' and '{}'",
            a.type_name(),
            b.type_name()
        ))),
    }
}

fn seq_cmp(x: &[Object], y: &[Object], depth: usize) -> Result<Ordering> {
    for (p, q) in x.iter().zip(y) {
        if !eq_at(p, q, depth + 1) {
            return cmp_at(p, q, depth + 1);
        }
    }
    Ok(x.len().cmp(&y.len()))
}

pub fn compare(op: CmpOp, a: &Object, b: &Object) -> Result<bool> {
    let ordering = |a: &Object, b: &Object| -> Result<Option<Ordering>> {
        match (num(a), num(b)) {
            (Some(Num::Int(x)), Some(Num::Int(y))) => Ok(Some(x.cmp(&y))),
            (Some(x), Some(y)) => Ok(x.as_f64().partial_cmp(&y.as_f64())),
            _ => cmp_at(a, b, 0).map(Some).map_err(|err| match err {
                Fault::Raised { exc, .. } if exc.kind == "TypeError" => Fault::type_error(format!(
                    "'{}' not supported between instances of '{}' and '{}'",
                    op.symbol(),
                    a.type_name(),
                    b.type_name()
                )),
                other => other,
            }),
        }
    };
    Ok(match op {
        CmpOp::Eq => py_eq(a, b),
        CmpOp::NotEq => !py_eq(a, b),
        CmpOp::Lt => ordering(a, b)? == Some(Ordering::Less),
        CmpOp::LtE => matches!(ordering(a, b)?, Some(Ordering::Less | Ordering::Equal)),
        CmpOp::Gt => ordering(a, b)? == Some(Ordering::Greater),
        CmpOp::GtE => matches!(ordering(a, b)?, Some(Ordering::Greater | Ordering::Equal)),
        CmpOp::In => contains(b, a)?,
        CmpOp::NotIn => !contains(b, a)?,
        CmpOp::Is => is_same(a, b),
        CmpOp::IsNot => !is_same(a, b),
    })
}

pub fn contains(container: &Object, item: &Object) -> Result<bool> {
    match container {
        Object::Str(s) => match item {
            Object::Str(sub) => Ok(s.contains(&**sub)),
            other => Err(Fault::type_error(format!(
                "'in <string>' requires string as left operand, not {}",
                other.type_name()
            ))),
        },
        Object::List(items) => Ok(items.borrow().iter().any(|x| py_eq(x, item))),
        Object::Tuple(items) => Ok(items.iter().any(|x| py_eq(x, item))),
        Object::Dict(entries) => {
            check_hashable(item)?;
            Ok(entries.borrow().iter().any(|(k, _)| py_eq(k, item)))
        }
        Object::Range(start, _, step) => Ok(match num(item) {
            Some(Num::Int(n)) => {
                let offset = n as i128 - *start as i128;
                offset % *step as i128 == 0
                    && offset / (*step as i128) >= 0
                    && ((offset / *step as i128) as usize) < range_len(container)
            }
            Some(Num::Float(x)) if x.fract() == 0.0 => {
                contains(container, &Object::Int(x as i64))?
            }
            _ => false,
        }),
        other => Err(Fault::type_error(format!(
            "argument of type '{}' is not iterable",
            other.type_name()
        ))),
    }
}

pub fn check_hashable(obj: &Object) -> Result<()> {
    match obj {
        Object::List(_) | Object::Dict(_) => Err(Fault::type_error(format!(
            "unhashable type: '{}'",
            obj.type_name()
        ))),
        Object::Tuple(items) => items.iter().try_for_each(check_hashable),
        _ => Ok(()),
    }
}

pub fn unary(op: UnaryOp, operand: &Object) -> Result<Object> {
    let bad = || {
        Fault::type_error(format!(
            "bad operand type for unary {}: '{}'",
            match op {
                UnaryOp::Neg => "-",
                UnaryOp::Pos => "+",
                UnaryOp::Invert => "~",
                UnaryOp::Not => "not",
            },
            operand.type_name()
        ))
    };
    match op {
        UnaryOp::Not => Ok(Object::Bool(!operand.truthy())),
        UnaryOp::Neg => match num(operand) {
            Some(Num::Int(n)) => n.checked_neg().map(Object::Int).ok_or_else(Fault::overflow),
            Some(Num::Float(x)) => Ok(Object::Float(-x)),
            None => Err(bad()),
        },
        UnaryOp::Pos => match num(operand) {
            Some(Num::Int(n)) => Ok(Object::Int(n)),
            Some(Num::Float(x)) => Ok(Object::Float(x)),
            None => Err(bad()),
        },
        UnaryOp::Invert => match num(operand) {
            Some(Num::Int(n)) => Ok(Object::Int(!n)),
            _ => Err(bad()),
        },
    }
}

pub fn binary(op: BinOp, a: &Object, b: &Object, max_len: usize) -> Result<Object> {
    if let (Some(x), Some(y)) = (num(a), num(b)) {
        return numeric(op, x, y);
    }
    let unsupported = || {
        Fault::type_error(format!(
            "unsupported operand type(s) for {}: '{}' and '{}'",
            op.symbol(),
            a.type_name(),
            b.type_name()
        ))
    };
    match (op, a, b) {
        (BinOp::Add, Object::Str(x), Object::Str(y)) => {
            check_len(x.len() + y.len(), max_len)?;
            let mut s = String::with_capacity(x.len() + y.len());
            s.push_str(x);
            s.push_str(y);
            Ok(Object::Str(s.into()))
        }
        (BinOp::Add, Object::List(x), Object::List(y)) => {
            let mut items = x.borrow().clone();
            items.extend(y.borrow().iter().cloned());
            check_len(items.len(), max_len)?;
            Ok(Object::list(items))
        }
        (BinOp::Add, Object::Tuple(x), Object::Tuple(y)) => {
            check_len(x.len() + y.len(), max_len)?;
            Ok(Object::tuple(x.iter().chain(y.iter()).cloned().collect()))
        }
        (BinOp::Mul, seq, count) | (BinOp::Mul, count, seq)
            if matches!(seq, Object::Str(_) | Object::List(_) | Object::Tuple(_))
                && matches!(count, Object::Int(_) | Object::Bool(_)) =>
        {
            let n = match num(count) {
                Some(Num::Int(n)) => n.max(0) as usize,
                _ => 0,
            };
            repeat(seq, n, max_len)
        }
        (BinOp::Mod, Object::Str(template), args) => {
            super::format::percent_format(template, args).and_then(|s| {
                check_len(s.chars().count(), max_len)?;
                Ok(Object::Str(s.into()))
            })
        }
        _ => Err(unsupported()),
    }
}

fn repeat(seq: &Object, n: usize, max_len: usize) -> Result<Object> {
    match seq {
        Object::Str(s) => {
            check_len(s.chars().count().saturating_mul(n), max_len)?;
            Ok(Object::Str(s.repeat(n).into()))
        }
        Object::List(items) => {
            let items = items.borrow();
            check_len(items.len().saturating_mul(n), max_len)?;
            Ok(Object::list(repeat_items(&items, n)))
        }
        Object::Tuple(items) => {
            check_len(items.len().saturating_mul(n), max_len)?;
            Ok(Object::tuple(repeat_items(items, n)))
        }
        _ => Ok(seq.clone()),
    }
}

fn repeat_items(items: &[Object], n: usize) -> Vec<Object> {
    let mut out = Vec::with_capacity(items.len() * n);
    for _ in 0..n {
        out.extend(items.iter().cloned());
    }
    out
}

pub fn check_len(len: usize, max_len: usize) -> Result<()> {
    if len > max_len {
        Err(Fault::memory())
    } else {
        Ok(())
    }
}

fn numeric(op: BinOp, x: Num, y: Num) -> Result<Object> {
    use Num::Int as I;

    let int = |r: Option<i64>| r.map(Object::Int).ok_or_else(Fault::overflow);
    match op {
        BinOp::Add => match (x, y) {
            (I(a), I(b)) => int(a.checked_add(b)),
            _ => Ok(Object::Float(x.as_f64() + y.as_f64())),
        },
        BinOp::Sub => match (x, y) {
            (I(a), I(b)) => int(a.checked_sub(b)),
            _ => Ok(Object::Float(x.as_f64() - y.as_f64())),
        },
        BinOp::Mul => match (x, y) {
            (I(a), I(b)) => int(a.checked_mul(b)),
            _ => Ok(Object::Float(x.as_f64() * y.as_f64())),
        },
        BinOp::Div => {
            let d = y.as_f64();
            if d == 0.0 {
                return Err(Fault::zero_division("division by zero"));
            }
            Ok(Object::Float(x.as_f64() / d))
        }
        BinOp::FloorDiv => match (x, y) {
            (I(_), I(0)) => Err(Fault::zero_division("integer division or modulo by zero")),
            (I(a), I(b)) => int(floor_div(a, b)),
            _ => {
                let d = y.as_f64();
                if d == 0.0 {
                    return Err(Fault::zero_division("float floor division by zero"));
                }
                Ok(Object::Float((x.as_f64() / d).floor()))
            }
        },
        BinOp::Mod => match (x, y) {
            (I(_), I(0)) => Err(Fault::zero_division("integer division or modulo by zero")),
            (I(a), I(b)) => int(floor_mod(a, b)),
            _ => {
                let d = y.as_f64();
                if d == 0.0 {
                    return Err(Fault::zero_division("float modulo"));
                }
                let n = x.as_f64();
                let r = n % d;
                Ok(Object::Float(if r != 0.0 && (r < 0.0) != (d < 0.0) {
                    r + d
                } else {
                    r
                }))
            }
        },
        BinOp::Pow => match (x, y) {
            (I(a), I(b)) if b >= 0 => {
                let exp = u32::try_from(b).map_err(|_| Fault::overflow())?;
                int(a.checked_pow(exp))
            }
            (I(0), I(_)) => Err(Fault::zero_division(
                "0.0 cannot be raised to a negative power",
            )),
            _ => {
                let (a, b) = (x.as_f64(), y.as_f64());
                if a == 0.0 && b < 0.0 {
                    return Err(Fault::zero_division(
                        "0.0 cannot be raised to a negative power",
                    ));
                }
                if a < 0.0 && b.fract() != 0.0 {
                    return Err(Fault::value_error("math domain error"));
                }
                Ok(Object::Float(a.powf(b)))
            }
        },
        BinOp::BitAnd | BinOp::BitOr | BinOp::BitXor | BinOp::Shl | BinOp::Shr => {
            let (a, b) = match (x, y) {
                (I(a), I(b)) => (a, b),
                _ => {
                    return Err(Fault::type_error(format!(
                        "unsupported operand type(s) for {}: 'float'",
                        op.symbol()
                    )))
                }
            };
            match op {
                BinOp::BitAnd => Ok(Object::Int(a & b)),
                BinOp::BitOr => Ok(Object::Int(a | b)),
                BinOp::BitXor => Ok(Object::Int(a ^ b)),
                _ if b < 0 => Err(Fault::value_error("negative shift count")),
                BinOp::Shl => {
                    let shifted = u32::try_from(b)
                        .ok()
                        .and_then(|b| a.checked_shl(b))
                        .filter(|r| r >> b == a);
                    int(shifted)
                }
                _ => Ok(Object::Int(if b >= 64 {
                    if a < 0 {
                        -1
                    } else {
                        0
                    }
                } else {
                    a >> b
                })),
            }
        }
    }
}

pub fn floor_div(a: i64, b: i64) -> Option<i64> {
    let q = a.checked_div(b)?;
    if a % b != 0 && ((a < 0) != (b < 0)) {
        q.checked_sub(1)
    } else {
        Some(q)
    }
}

pub fn floor_mod(a: i64, b: i64) -> Option<i64> {
    let r = a.checked_rem(b)?;
    Some(if r != 0 && ((r < 0) != (b < 0)) { r + b } else { r })
}

fn index_of(index: &Object, len: usize, what: &str) -> Result<usize> {
    let i = match num(index) {
        Some(Num::Int(i)) => i,
        _ => {
            return Err(Fault::type_error(format!(
                "{} indices must be integers or slices, not {}",
                what,
                index.type_name()
            )))
        }
    };
    let resolved = if i < 0 { i + len as i64 } else { i };
    if resolved < 0 || resolved >= len as i64 {
        return Err(Fault::index_error(format!("{} index out of range", what)));
    }
    Ok(resolved as usize)
}

pub fn getitem(obj: &Object, index: &Object) -> Result<Object> {
    match obj {
        Object::List(items) => {
            let items = items.borrow();
            let i = index_of(index, items.len(), "list")?;
            Ok(items[i].clone())
        }
        Object::Tuple(items) => {
            let i = index_of(index, items.len(), "tuple")?;
            Ok(items[i].clone())
        }
        Object::Str(s) => {
            let len = s.chars().count();
            let i = index_of(index, len, "string")?;
            Ok(s.chars().nth(i).map_or(Object::None, |c| Object::str(c.encode_utf8(&mut [0; 4]))))
        }
        Object::Range(start, _, step) => {
            let i = index_of(index, range_len(obj), "range object")?;
            Ok(Object::Int(start + i as i64 * step))
        }
        Object::Dict(entries) => {
            check_hashable(index)?;
            entries
                .borrow()
                .iter()
                .find(|(k, _)| py_eq(k, index))
                .map(|(_, v)| v.clone())
                .ok_or_else(|| Fault::raise("KeyError", describe(index)))
        }
        other => Err(Fault::type_error(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

/// Inserts or overwrites `key`, keeping first-insertion order.
pub fn dict_insert(entries: &mut Vec<(Object, Object)>, key: Object, value: Object) {
    match entries.iter_mut().find(|(k, _)| py_eq(k, &key)) {
        Some(entry) => entry.1 = value,
        None => entries.push((key, value)),
    }
}

pub fn setitem(obj: &Object, index: &Object, value: Object, max_len: usize) -> Result<()> {
    match obj {
        Object::List(items) => {
            let mut items = items.borrow_mut();
            let len = items.len();
            let i = index_of(index, len, "list").map_err(|err| match err {
                Fault::Raised { exc, .. } if exc.kind == "IndexError" => {
                    Fault::index_error("list assignment index out of range")
                }
                other => other,
            })?;
            items[i] = value;
            Ok(())
        }
        Object::Dict(entries) => {
            check_hashable(index)?;
            let mut entries = entries.borrow_mut();
            match entries.iter_mut().find(|(k, _)| py_eq(k, index)) {
                Some(entry) => entry.1 = value,
                None => {
                    check_len(entries.len() + 1, max_len)?;
                    entries.push((index.clone(), value));
                }
            }
            Ok(())
        }
        other => Err(Fault::type_error(format!(
            "'{}' object does not support item assignment",
            other.type_name()
        ))),
    }
}

fn slice_bound(bound: Option<&Object>) -> Result<Option<i64>> {
    match bound {
        None | Some(Object::None) => Ok(None),
        Some(obj) => match num(obj) {
            Some(Num::Int(n)) => Ok(Some(n)),
            _ => Err(Fault::type_error(
                "slice indices must be integers or None",
            )),
        },
    }
}

/// Normalized `(start, stop, step)` of `[lower:upper:step]` over `len` items.
fn slice_bounds(
    len: usize,
    lower: Option<&Object>,
    upper: Option<&Object>,
    step: Option<&Object>,
) -> Result<(i64, i64, i64)> {
    let step = slice_bound(step)?.unwrap_or(1);
    if step == 0 {
        return Err(Fault::value_error("slice step cannot be zero"));
    }
    let len = i64::try_from(len).unwrap_or(i64::MAX);
    let clamp = |bound: Option<i64>, default: i64| -> i64 {
        match bound {
            None => default,
            Some(b) => {
                let b = if b < 0 { b.saturating_add(len) } else { b };
                if step > 0 {
                    b.clamp(0, len)
                } else {
                    b.clamp(-1, len - 1)
                }
            }
        }
    };
    Ok(if step > 0 {
        (clamp(slice_bound(lower)?, 0), clamp(slice_bound(upper)?, len), step)
    } else {
        (clamp(slice_bound(lower)?, len - 1), clamp(slice_bound(upper)?, -1), step)
    })
}

/// Positions selected by `[lower:upper:step]` over `len` items.
pub fn slice_positions(
    len: usize,
    lower: Option<&Object>,
    upper: Option<&Object>,
    step: Option<&Object>,
) -> Result<Vec<usize>> {
    let (start, stop, step) = slice_bounds(len, lower, upper, step)?;
    let mut positions = Vec::new();
    let mut i = start;
    while (step > 0 && i < stop) || (step < 0 && i > stop) {
        positions.push(i as usize);
        i = match i.checked_add(step) {
            Some(next) => next,
            None => break,
        };
    }
    Ok(positions)
}

pub fn getslice(
    obj: &Object,
    lower: Option<&Object>,
    upper: Option<&Object>,
    step: Option<&Object>,
) -> Result<Object> {
    match obj {
        Object::List(items) => {
            let items = items.borrow();
            let picked = slice_positions(items.len(), lower, upper, step)?;
            Ok(Object::list(picked.into_iter().map(|i| items[i].clone()).collect()))
        }
        Object::Tuple(items) => {
            let picked = slice_positions(items.len(), lower, upper, step)?;
            Ok(Object::tuple(picked.into_iter().map(|i| items[i].clone()).collect()))
        }
        Object::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            let picked = slice_positions(chars.len(), lower, upper, step)?;
            Ok(Object::Str(picked.into_iter().map(|i| chars[i]).collect::<String>().into()))
        }
        Object::Range(base, _, stride) => {
            let (start, stop, step) = slice_bounds(range_len(obj), lower, upper, step)?;
            let at = |i: i64| i.checked_mul(*stride).and_then(|off| base.checked_add(off));
            match (at(start), at(stop), stride.checked_mul(step)) {
                (Some(start), Some(stop), Some(step)) => Ok(Object::Range(start, stop, step)),
                _ => Err(Fault::overflow()),
            }
        }
        other => Err(Fault::type_error(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

/// Walks a container in place, so changes made while iterating are seen.
pub enum ObjIter {
    List { list: ListRef, next: usize },
    Tuple { items: Rc<[Object]>, next: usize },
    Keys { dict: DictRef, next: usize },
    Chars { text: Rc<str>, pos: usize },
    Range { next: i64, stop: i64, step: i64 },
}

impl Iterator for ObjIter {
    type Item = Object;

    fn next(&mut self) -> Option<Object> {
        match self {
            ObjIter::List { list, next } => {
                let item = list.borrow().get(*next).cloned()?;
                *next += 1;
                Some(item)
            }
            ObjIter::Tuple { items, next } => {
                let item = items.get(*next).cloned()?;
                *next += 1;
                Some(item)
            }
            ObjIter::Keys { dict, next } => {
                let key = dict.borrow().get(*next).map(|(k, _)| k.clone())?;
                *next += 1;
                Some(key)
            }
            ObjIter::Chars { text, pos } => {
                let c = text[*pos..].chars().next()?;
                *pos += c.len_utf8();
                Some(Object::str(c.encode_utf8(&mut [0; 4])))
            }
            ObjIter::Range { next, stop, step } => {
                let live = (*step > 0 && *next < *stop) || (*step < 0 && *next > *stop);
                if !live {
                    return None;
                }
                let value = *next;
                *next = next.checked_add(*step).unwrap_or(*stop);
                Some(Object::Int(value))
            }
        }
    }
}

pub fn iterate(obj: &Object) -> Result<ObjIter> {
    Ok(match obj {
        Object::List(list) => ObjIter::List {
            list: list.clone(),
            next: 0,
        },
        Object::Tuple(items) => ObjIter::Tuple {
            items: items.clone(),
            next: 0,
        },
        Object::Str(text) => ObjIter::Chars {
            text: text.clone(),
            pos: 0,
        },
        Object::Dict(dict) => ObjIter::Keys {
            dict: dict.clone(),
            next: 0,
        },
        Object::Range(start, stop, step) => ObjIter::Range {
            next: *start,
            stop: *stop,
            step: *step,
        },
        other => {
            return Err(Fault::type_error(format!(
                "'{}' object is not iterable",
                other.type_name()
            )))
        }
    })
}

pub fn len_of(obj: &Object) -> Result<usize> {
    match obj {
        Object::Str(s) => Ok(s.chars().count()),
        Object::List(items) => Ok(items.borrow().len()),
        Object::Tuple(items) => Ok(items.len()),
        Object::Dict(entries) => Ok(entries.borrow().len()),
        Object::Range(..) => Ok(range_len(obj)),
        other => Err(Fault::type_error(format!(
            "object of type '{}' has no len()",
            other.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAX: usize = 1_000_000;

    fn int(n: i64) -> Object {
        Object::Int(n)
    }

    fn ints(xs: &[i64]) -> Object {
        Object::list(xs.iter().map(|&x| int(x)).collect())
    }

    fn message(err: Fault) -> String {
        err.to_string()
    }

    #[test]
    fn floor_semantics() {
        assert_eq!(floor_div(7, 2), Some(3));
        assert_eq!(floor_div(-7, 2), Some(-4));
        assert_eq!(floor_div(7, -2), Some(-4));
        assert_eq!(floor_mod(-7, 2), Some(1));
        assert_eq!(floor_mod(7, -2), Some(-1));
        assert_eq!(floor_div(i64::MIN, -1), None);
    }

    #[test]
    fn arithmetic_errors() {
        let err = binary(BinOp::Div, &int(1), &int(0), MAX).unwrap_err();
        assert_eq!(message(err), "ZeroDivisionError: division by zero");

        let err = binary(BinOp::Add, &int(1), &Object::str("a"), MAX).unwrap_err();
        assert_eq!(
            message(err),
            "TypeError: unsupported operand type(s) for +: 'int' and 'str'"
        );

        let err = binary(BinOp::Mul, &int(i64::MAX), &int(2), MAX).unwrap_err();
        assert_eq!(message(err), "OverflowError: integer overflow");
    }

    #[test]
    fn mixed_numbers() {
        assert!(matches!(binary(BinOp::Div, &int(7), &int(2), MAX), Ok(Object::Float(x)) if x == 3.5));
        assert!(matches!(binary(BinOp::Add, &Object::Bool(true), &int(2), MAX), Ok(Object::Int(3))));
        assert!(matches!(binary(BinOp::Pow, &int(2), &int(-1), MAX), Ok(Object::Float(x)) if x == 0.5));
        assert!(matches!(binary(BinOp::Mod, &Object::Float(-1.0), &int(3), MAX), Ok(Object::Float(x)) if x == 2.0));
    }

    #[test]
    fn repetition_is_bounded() {
        let s = binary(BinOp::Mul, &Object::str("ab"), &int(3), MAX).unwrap();
        assert!(matches!(s, Object::Str(ref s) if &**s == "ababab"));
        let err = binary(BinOp::Mul, &Object::str("ab"), &int(1 << 40), MAX).unwrap_err();
        assert_eq!(message(err), "MemoryError: size limit exceeded");
    }

    #[test]
    fn indexing() {
        let xs = ints(&[1, 2, 3]);
        assert!(matches!(getitem(&xs, &int(-1)), Ok(Object::Int(3))));
        assert_eq!(
            message(getitem(&xs, &int(3)).unwrap_err()),
            "IndexError: list index out of range"
        );
        assert_eq!(
            message(getitem(&xs, &Object::str("0")).unwrap_err()),
            "TypeError: list indices must be integers or slices, not str"
        );
        let d = Object::dict(vec![(Object::str("a"), int(1))]);
        assert_eq!(message(getitem(&d, &Object::str("b")).unwrap_err()), "KeyError: 'b'");
    }

    #[test]
    fn slicing() {
        assert_eq!(slice_positions(5, None, None, Some(&int(-1))).unwrap(), vec![4, 3, 2, 1, 0]);
        assert_eq!(slice_positions(5, Some(&int(1)), Some(&int(-1)), None).unwrap(), vec![1, 2, 3]);
        assert_eq!(slice_positions(5, Some(&int(-2)), None, None).unwrap(), vec![3, 4]);
        assert_eq!(slice_positions(5, Some(&int(10)), None, None).unwrap(), Vec::<usize>::new());
        assert_eq!(slice_positions(5, None, None, Some(&int(2))).unwrap(), vec![0, 2, 4]);
        assert!(slice_positions(5, None, None, Some(&int(0))).is_err());
    }

    #[test]
    fn comparisons() {
        assert!(compare(CmpOp::Lt, &ints(&[1, 2]), &ints(&[1, 3])).unwrap());
        assert!(compare(CmpOp::Eq, &int(1), &Object::Float(1.0)).unwrap());
        assert!(compare(CmpOp::In, &int(2), &Object::Range(0, 10, 2)).unwrap());
        assert!(!compare(CmpOp::In, &int(3), &Object::Range(0, 10, 2)).unwrap());
        assert!(compare(CmpOp::In, &Object::str("ell"), &Object::str("hello")).unwrap());
        assert_eq!(
            message(compare(CmpOp::Lt, &int(1), &Object::str("a")).unwrap_err()),
            "TypeError: '<' not supported between instances of 'int' and 'str'"
        );
    }

    #[test]
    fn ranges_iterate_lazily() {
        let it = iterate(&Object::Range(0, i64::MAX, 1)).unwrap();
        let first: Vec<i64> = it
            .take(3)
            .map(|o| match o {
                Object::Int(n) => n,
                _ => -1,
            })
            .collect();
        assert_eq!(first, vec![0, 1, 2]);
    }

    #[test]
    fn lists_iterate_in_place() {
        let xs = ints(&[1, 2]);
        let mut it = iterate(&xs).unwrap();
        assert!(matches!(it.next(), Some(Object::Int(1))));
        if let Object::List(list) = &xs {
            list.borrow_mut().push(int(3));
        }
        assert_eq!(it.count(), 2);

        let chars: Vec<String> = iterate(&Object::str("añb"))
            .unwrap()
            .map(|o| match o {
                Object::Str(s) => s.to_string(),
                _ => String::new(),
            })
            .collect();
        assert_eq!(chars, ["a", "ñ", "b"]);
    }
}
