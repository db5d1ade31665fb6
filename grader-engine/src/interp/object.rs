use super::ast::FuncDef;
use super::builtins::Builtin;
use super::error::Exception;
use crate::value::Value;

use std::cell::RefCell;
use std::collections::HashMap;
use std::mem;
use std::rc::{Rc, Weak};

pub type ListRef = Rc<RefCell<Vec<Object>>>;
pub type DictRef = Rc<RefCell<Vec<(Object, Object)>>>;

/// Nesting beyond this is treated as a cycle.
pub const MAX_DEPTH: usize = 64;

/// Most nodes converted into values for one program's bindings.
pub const MAX_VALUE_NODES: usize = 2_000_000;

/// Bytes one container slot takes.
pub const SLOT: usize = mem::size_of::<Object>();

/// Reference counts plus the container's own fields.
const HEADER: usize = 32;

#[derive(Debug, Clone)]
pub enum Object {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    List(ListRef),
    Tuple(Rc<[Object]>),
    Dict(DictRef),
    Range(i64, i64, i64),
    Function(Rc<Function>),
    Builtin(Builtin),
    Method(Rc<Object>, &'static str),
    Module(&'static str),
    Exception(Rc<Exception>),
    ExceptionType(&'static str),
}

#[derive(Debug)]
pub struct Function {
    pub def: Rc<FuncDef>,
    pub defaults: Vec<Option<Object>>,
    pub captured: Option<Rc<HashMap<String, Object>>>,
}

impl Object {
    pub fn str(s: &str) -> Object {
        Object::Str(Rc::from(s))
    }

    pub fn list(items: Vec<Object>) -> Object {
        Object::List(Rc::new(RefCell::new(items)))
    }

    pub fn tuple(items: Vec<Object>) -> Object {
        Object::Tuple(Rc::from(items))
    }

    pub fn dict(entries: Vec<(Object, Object)>) -> Object {
        Object::Dict(Rc::new(RefCell::new(entries)))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Object::None => "NoneType",
            Object::Bool(_) => "bool",
            Object::Int(_) => "int",
            Object::Float(_) => "float",
            Object::Str(_) => "str",
            Object::List(_) => "list",
            Object::Tuple(_) => "tuple",
            Object::Dict(_) => "dict",
            Object::Range(..) => "range",
            Object::Function(_) => "function",
            Object::Builtin(b) if b.is_type() => "type",
            Object::Builtin(_) | Object::Method(..) => "builtin_function_or_method",
            Object::Module(_) => "module",
            Object::Exception(exc) => exc.kind,
            Object::ExceptionType(_) => "type",
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Object::None => false,
            Object::Bool(b) => *b,
            Object::Int(n) => *n != 0,
            Object::Float(x) => *x != 0.0,
            Object::Str(s) => !s.is_empty(),
            Object::List(items) => !items.borrow().is_empty(),
            Object::Tuple(items) => !items.is_empty(),
            Object::Dict(entries) => !entries.borrow().is_empty(),
            Object::Range(..) => range_len(self) > 0,
            _ => true,
        }
    }

    /// Converts a final binding into a comparable value. Callables, modules
    /// and ranges have no value form.
    pub fn to_value(&self) -> Option<Value> {
        let mut budget = MAX_VALUE_NODES;
        self.to_value_within(&mut budget)
    }

    /// Like [`Object::to_value`], spending one unit of `budget` per node.
    /// Shared references are expanded each time they appear. Gives up with
    /// `None` once the budget is spent, leaving `budget` partly drawn.
    pub fn to_value_within(&self, budget: &mut usize) -> Option<Value> {
        self.to_value_at(0, budget)
    }

    fn to_value_at(&self, depth: usize, budget: &mut usize) -> Option<Value> {
        if depth > MAX_DEPTH || *budget == 0 {
            return None;
        }
        *budget -= 1;
        let items = |items: &[Object], budget: &mut usize| -> Option<Vec<Value>> {
            items.iter().map(|item| item.to_value_at(depth + 1, budget)).collect()
        };
        Some(match self {
            Object::None => Value::None,
            Object::Bool(b) => Value::Boolean(*b),
            Object::Int(n) => Value::Integer(*n),
            Object::Float(x) => Value::Float(*x),
            Object::Str(s) => Value::String(s.to_string()),
            Object::List(list) => Value::Sequence(items(&list.borrow(), budget)?),
            Object::Tuple(tuple) => Value::Tuple(items(tuple, budget)?),
            Object::Dict(dict) => Value::Mapping(
                dict.borrow()
                    .iter()
                    .map(|(k, v)| {
                        Some((
                            k.to_value_at(depth + 1, budget)?,
                            v.to_value_at(depth + 1, budget)?,
                        ))
                    })
                    .collect::<Option<_>>()?,
            ),
            _ => return None,
        })
    }

    /// Estimated heap bytes held by this object alone, not counting what it
    /// refers to.
    pub fn own_size(&self) -> usize {
        match self {
            Object::Str(s) => HEADER + s.len(),
            Object::List(list) => HEADER + list.borrow().len() * SLOT,
            Object::Tuple(items) => HEADER + items.len() * SLOT,
            Object::Dict(dict) => HEADER + dict.borrow().len() * 2 * SLOT,
            Object::Function(function) => {
                let env = function.captured.as_ref().map_or(0, |env| HEADER + env.len() * (SLOT + HEADER));
                HEADER + function.defaults.len() * SLOT + env
            }
            Object::Method(..) => HEADER + SLOT,
            Object::Exception(exc) => HEADER + exc.message.len(),
            _ => 0,
        }
    }

    /// True when nothing else holds this object's allocation.
    pub fn is_unshared(&self) -> bool {
        match self {
            Object::Str(s) => Rc::strong_count(s) == 1,
            Object::List(list) => Rc::strong_count(list) == 1,
            Object::Tuple(items) => Rc::strong_count(items) == 1,
            Object::Dict(dict) => Rc::strong_count(dict) == 1,
            Object::Function(f) => Rc::strong_count(f) == 1,
            Object::Method(recv, _) => Rc::strong_count(recv) == 1,
            Object::Exception(exc) => Rc::strong_count(exc) == 1,
            _ => false,
        }
    }
}

/// A weak handle on a built object. It answers whether the object is still
/// alive without keeping it so.
#[derive(Debug)]
pub enum Tracked {
    Str(Weak<str>),
    List(Weak<RefCell<Vec<Object>>>),
    Tuple(Weak<[Object]>),
    Dict(Weak<RefCell<Vec<(Object, Object)>>>),
    Function(Weak<Function>),
    Method(Weak<Object>, &'static str),
    Exception(Weak<Exception>),
}

impl Tracked {
    /// Handle plus allocation address, for objects that own heap memory.
    pub fn of(obj: &Object) -> Option<(usize, Tracked)> {
        Some(match obj {
            Object::Str(s) => (addr(Rc::as_ptr(s)), Tracked::Str(Rc::downgrade(s))),
            Object::List(list) => (addr(Rc::as_ptr(list)), Tracked::List(Rc::downgrade(list))),
            Object::Tuple(items) => (addr(Rc::as_ptr(items)), Tracked::Tuple(Rc::downgrade(items))),
            Object::Dict(dict) => (addr(Rc::as_ptr(dict)), Tracked::Dict(Rc::downgrade(dict))),
            Object::Function(f) => (addr(Rc::as_ptr(f)), Tracked::Function(Rc::downgrade(f))),
            Object::Method(recv, name) => (addr(Rc::as_ptr(recv)), Tracked::Method(Rc::downgrade(recv), *name)),
            Object::Exception(exc) => (addr(Rc::as_ptr(exc)), Tracked::Exception(Rc::downgrade(exc))),
            _ => return None,
        })
    }

    /// Current [`Object::own_size`], or `None` once the object is gone.
    pub fn live_size(&self) -> Option<usize> {
        let obj = match self {
            Tracked::Str(s) => Object::Str(s.upgrade()?),
            Tracked::List(list) => Object::List(list.upgrade()?),
            Tracked::Tuple(items) => Object::Tuple(items.upgrade()?),
            Tracked::Dict(dict) => Object::Dict(dict.upgrade()?),
            Tracked::Function(f) => Object::Function(f.upgrade()?),
            Tracked::Method(recv, name) => Object::Method(recv.upgrade()?, *name),
            Tracked::Exception(exc) => Object::Exception(exc.upgrade()?),
        };
        Some(obj.own_size())
    }
}

fn addr<T: ?Sized>(ptr: *const T) -> usize {
    ptr as *const u8 as usize
}

pub fn range_len(range: &Object) -> usize {
    match *range {
        Object::Range(start, stop, step) => {
            let (start, stop, step) = (start as i128, stop as i128, step as i128);
            let len = if step > 0 {
                (stop - start + step - 1) / step
            } else {
                (start - stop - step - 1) / -step
            };
            len.max(0) as usize
        }
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_lengths() {
        assert_eq!(range_len(&Object::Range(0, 10, 1)), 10);
        assert_eq!(range_len(&Object::Range(0, 10, 3)), 4);
        assert_eq!(range_len(&Object::Range(10, 0, -1)), 10);
        assert_eq!(range_len(&Object::Range(10, 0, -3)), 4);
        assert_eq!(range_len(&Object::Range(5, 5, 1)), 0);
        assert_eq!(range_len(&Object::Range(5, 0, 1)), 0);
    }

    #[test]
    fn values() {
        let obj = Object::tuple(vec![Object::Int(70), Object::Float(52.5)]);
        assert_eq!(
            obj.to_value(),
            Some(Value::Tuple(vec![Value::Integer(70), Value::Float(52.5)]))
        );

        let cyclic = Object::list(vec![]);
        if let Object::List(list) = &cyclic {
            list.borrow_mut().push(cyclic.clone());
        }
        assert_eq!(cyclic.to_value(), None);
        assert_eq!(Object::Range(0, 3, 1).to_value(), None);
    }

    #[test]
    fn value_conversion_is_budgeted() {
        let row = Object::list(vec![Object::Int(0); 10]);
        let grid = Object::list(vec![row.clone(); 10]);

        let mut budget = 111;
        assert!(grid.to_value_within(&mut budget).is_some());
        assert_eq!(budget, 0);

        let mut budget = 110;
        assert_eq!(grid.to_value_within(&mut budget), None);

        let wide = Object::list(vec![Object::list(vec![Object::Int(0); 1_000_000]); 1_000_000]);
        assert_eq!(wide.to_value(), None);
    }

    #[test]
    fn tracked_objects_report_liveness() {
        let row = Object::list(vec![Object::Int(0); 100]);
        let (id, handle) = Tracked::of(&row).unwrap();
        assert_eq!(Tracked::of(&row.clone()).unwrap().0, id);
        assert_eq!(handle.live_size(), Some(HEADER + 100 * SLOT));

        if let Object::List(list) = &row {
            list.borrow_mut().push(Object::None);
        }
        assert_eq!(handle.live_size(), Some(HEADER + 101 * SLOT));

        drop(row);
        assert_eq!(handle.live_size(), None);
        assert!(Tracked::of(&Object::Int(1)).is_none());
    }

    #[test]
    fn sharing_is_seen() {
        let shared = Object::str("shared");
        let built = Object::list(vec![Object::str("new"), shared.clone()]);
        assert!(built.is_unshared());
        assert!(!shared.is_unshared());
        assert!(!Object::Int(3).is_unshared());
    }
}
