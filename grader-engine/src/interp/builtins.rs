//! Allowlisted builtin functions, the `math` module and container methods.

use super::ast::BinOp;
use super::error::{is_subclass, Fault, Result};
use super::eval::{plural, Interpreter};
use super::format::{describe, format_fields, repr, str_within, to_str};
use super::object::{DictRef, ListRef, Object, SLOT};
use super::ops;

use std::cmp::Ordering;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Print,
    Input,
    Len,
    Min,
    Max,
    Sum,
    Sorted,
    Reversed,
    Abs,
    Round,
    Int,
    Float,
    Str,
    Bool,
    List,
    Tuple,
    Dict,
    Range,
    Enumerate,
    Zip,
    Ord,
    Chr,
    Any,
    All,
    Isinstance,
    Repr,
    Sqrt,
    Floor,
    Ceil,
    Pow,
    Fabs,
    Exp,
    Log,
    Log10,
    Gcd,
    Factorial,
    Isclose,
}

const GLOBAL_FUNCTIONS: &[(&str, Builtin)] = &[
    ("print", Builtin::Print),
    ("input", Builtin::Input),
    ("len", Builtin::Len),
    ("min", Builtin::Min),
    ("max", Builtin::Max),
    ("sum", Builtin::Sum),
    ("sorted", Builtin::Sorted),
    ("reversed", Builtin::Reversed),
    ("abs", Builtin::Abs),
    ("round", Builtin::Round),
    ("int", Builtin::Int),
    ("float", Builtin::Float),
    ("str", Builtin::Str),
    ("bool", Builtin::Bool),
    ("list", Builtin::List),
    ("tuple", Builtin::Tuple),
    ("dict", Builtin::Dict),
    ("range", Builtin::Range),
    ("enumerate", Builtin::Enumerate),
    ("zip", Builtin::Zip),
    ("ord", Builtin::Ord),
    ("chr", Builtin::Chr),
    ("any", Builtin::Any),
    ("all", Builtin::All),
    ("isinstance", Builtin::Isinstance),
    ("repr", Builtin::Repr),
];

const MATH_FUNCTIONS: &[(&str, Builtin)] = &[
    ("sqrt", Builtin::Sqrt),
    ("floor", Builtin::Floor),
    ("ceil", Builtin::Ceil),
    ("pow", Builtin::Pow),
    ("fabs", Builtin::Fabs),
    ("exp", Builtin::Exp),
    ("log", Builtin::Log),
    ("log10", Builtin::Log10),
    ("gcd", Builtin::Gcd),
    ("factorial", Builtin::Factorial),
    ("isclose", Builtin::Isclose),
];

const STR_METHODS: &[&str] = &[
    "upper",
    "lower",
    "strip",
    "lstrip",
    "rstrip",
    "split",
    "join",
    "replace",
    "startswith",
    "endswith",
    "find",
    "index",
    "count",
    "title",
    "capitalize",
    "isdigit",
    "isalpha",
    "isalnum",
    "isspace",
    "isupper",
    "islower",
    "zfill",
    "center",
    "ljust",
    "rjust",
    "format",
];

const LIST_METHODS: &[&str] = &[
    "append", "extend", "pop", "insert", "remove", "index", "count", "sort", "reverse", "copy",
    "clear",
];

const DICT_METHODS: &[&str] = &[
    "get",
    "keys",
    "values",
    "items",
    "pop",
    "update",
    "copy",
    "clear",
    "setdefault",
];

impl Builtin {
    pub fn lookup(name: &str) -> Option<Builtin> {
        GLOBAL_FUNCTIONS
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, b)| *b)
    }

    pub fn name(self) -> &'static str {
        GLOBAL_FUNCTIONS
            .iter()
            .chain(MATH_FUNCTIONS)
            .find(|(_, b)| *b == self)
            .map_or("?", |(n, _)| n)
    }

    /// Builtins that name a type for `isinstance`.
    pub fn is_type(self) -> bool {
        matches!(
            self,
            Builtin::Int
                | Builtin::Float
                | Builtin::Str
                | Builtin::Bool
                | Builtin::List
                | Builtin::Tuple
                | Builtin::Dict
                | Builtin::Range
        )
    }
}

pub fn module_attr(module: &str, name: &str) -> Result<Object> {
    if let Some((_, builtin)) = MATH_FUNCTIONS.iter().find(|(n, _)| *n == name) {
        return Ok(Object::Builtin(*builtin));
    }
    match name {
        "pi" => Ok(Object::Float(std::f64::consts::PI)),
        "e" => Ok(Object::Float(std::f64::consts::E)),
        "tau" => Ok(Object::Float(std::f64::consts::TAU)),
        "inf" => Ok(Object::Float(f64::INFINITY)),
        "nan" => Ok(Object::Float(f64::NAN)),
        _ => Err(Fault::raise(
            "AttributeError",
            format!("module '{}' has no attribute '{}'", module, name),
        )),
    }
}

pub fn get_attr(obj: &Object, name: &str) -> Result<Object> {
    let methods: &[&'static str] = match obj {
        Object::Module(module) => return module_attr(module, name),
        Object::Str(_) => STR_METHODS,
        Object::List(_) => LIST_METHODS,
        Object::Dict(_) => DICT_METHODS,
        _ => &[],
    };
    match methods.iter().find(|m| **m == name) {
        Some(method) => Ok(Object::Method(Rc::new(obj.clone()), *method)),
        None => Err(Fault::attribute(obj.type_name(), name)),
    }
}

type Kwargs = Vec<(String, Object)>;

fn arity(name: &str, args: &[Object], min: usize, max: usize) -> Result<()> {
    let given = args.len();
    if given >= min && given <= max {
        return Ok(());
    }
    let (bound, n) = if min == max {
        ("exactly", min)
    } else if given < min {
        ("at least", min)
    } else {
        ("at most", max)
    };
    Err(Fault::type_error(format!(
        "{}() takes {} {} argument{} ({} given)",
        name,
        bound,
        n,
        plural(n),
        given
    )))
}

fn take_kwarg(kwargs: &mut Kwargs, key: &str) -> Option<Object> {
    let i = kwargs.iter().position(|(k, _)| k == key)?;
    Some(kwargs.remove(i).1)
}

fn no_kwargs(name: &str, kwargs: &[(String, Object)]) -> Result<()> {
    match kwargs.first() {
        Some((key, _)) => Err(Fault::type_error(format!(
            "{}() got an unexpected keyword argument '{}'",
            name, key
        ))),
        None => Ok(()),
    }
}

/// A positional argument, or the keyword of the same name.
fn arg_or_kwarg(args: &[Object], i: usize, kwargs: &mut Kwargs, key: &str) -> Option<Object> {
    take_kwarg(kwargs, key).or_else(|| args.get(i).cloned())
}

fn int_arg(obj: &Object) -> Result<i64> {
    match obj {
        Object::Int(n) => Ok(*n),
        Object::Bool(b) => Ok(i64::from(*b)),
        other => Err(Fault::type_error(format!(
            "'{}' object cannot be interpreted as an integer",
            other.type_name()
        ))),
    }
}

fn float_arg(obj: &Object) -> Result<f64> {
    match obj {
        Object::Int(n) => Ok(*n as f64),
        Object::Bool(b) => Ok(f64::from(u8::from(*b))),
        Object::Float(x) => Ok(*x),
        other => Err(Fault::type_error(format!(
            "must be real number, not {}",
            other.type_name()
        ))),
    }
}

fn str_arg<'a>(name: &str, obj: &'a Object) -> Result<&'a str> {
    match obj {
        Object::Str(s) => Ok(&**s),
        other => Err(Fault::type_error(format!(
            "{}() argument must be str, not {}",
            name,
            other.type_name()
        ))),
    }
}

fn opt_str(name: &str, obj: Option<Object>, default: &str) -> Result<String> {
    match obj {
        None | Some(Object::None) => Ok(default.to_owned()),
        Some(Object::Str(s)) => Ok(s.to_string()),
        Some(other) => Err(Fault::type_error(format!(
            "{} must be None or a string, not {}",
            name,
            other.type_name()
        ))),
    }
}

fn domain_error() -> Fault {
    Fault::value_error("math domain error")
}

fn float_to_int(x: f64) -> Result<Object> {
    if x.is_nan() {
        return Err(Fault::value_error("cannot convert float NaN to integer"));
    }
    if x.is_infinite() {
        return Err(Fault::raise(
            "OverflowError",
            "cannot convert float infinity to integer",
        ));
    }
    if x < i64::MIN as f64 || x >= i64::MAX as f64 {
        return Err(Fault::overflow());
    }
    Ok(Object::Int(x as i64))
}

fn round_half_even(x: f64) -> f64 {
    let rounded = x.round();
    if (x - x.trunc()).abs() == 0.5 {
        2.0 * (x / 2.0).round()
    } else {
        rounded
    }
}

fn round(value: &Object, ndigits: Option<&Object>) -> Result<Object> {
    let ndigits = match ndigits {
        None | Some(Object::None) => None,
        Some(n) => Some(int_arg(n)?),
    };
    match (value, ndigits) {
        (Object::Int(n), None) => Ok(Object::Int(*n)),
        (Object::Bool(b), None) => Ok(Object::Int(i64::from(*b))),
        (Object::Int(n), Some(d)) if d >= 0 => Ok(Object::Int(*n)),
        (Object::Int(n), Some(d)) => {
            let scale = 10f64.powi(d.clamp(-308, 0) as i32);
            float_to_int(round_half_even(*n as f64 * scale) / scale)
        }
        (Object::Float(x), None) => float_to_int(round_half_even(*x)),
        (Object::Float(x), Some(d)) => {
            if !x.is_finite() {
                return Ok(Object::Float(*x));
            }
            let scale = 10f64.powi(d.clamp(-308, 308) as i32);
            let scaled = x * scale;
            if !scaled.is_finite() {
                return Ok(Object::Float(*x));
            }
            Ok(Object::Float(round_half_even(scaled) / scale))
        }
        (other, _) => Err(Fault::type_error(format!(
            "type {} doesn't define __round__ method",
            other.type_name()
        ))),
    }
}

fn to_int(value: &Object, base: Option<i64>) -> Result<Object> {
    match (value, base) {
        (Object::Str(s), base) => {
            let base = base.unwrap_or(10);
            if !(2..=36).contains(&base) {
                return Err(Fault::value_error("int() base must be >= 2 and <= 36"));
            }
            let text = s.trim().replace('_', "");
            i64::from_str_radix(&text, base as u32)
                .map(Object::Int)
                .map_err(|_| {
                    Fault::value_error(format!(
                        "invalid literal for int() with base {}: {}",
                        base,
                        describe(value)
                    ))
                })
        }
        (_, Some(_)) => Err(Fault::type_error(
            "int() can't convert non-string with explicit base",
        )),
        (Object::Int(n), None) => Ok(Object::Int(*n)),
        (Object::Bool(b), None) => Ok(Object::Int(i64::from(*b))),
        (Object::Float(x), None) => float_to_int(x.trunc()),
        (other, None) => Err(Fault::type_error(format!(
            "int() argument must be a string or a real number, not '{}'",
            other.type_name()
        ))),
    }
}

fn to_float(value: &Object) -> Result<Object> {
    match value {
        Object::Float(x) => Ok(Object::Float(*x)),
        Object::Int(_) | Object::Bool(_) => Ok(Object::Float(float_arg(value)?)),
        Object::Str(s) => {
            let text = s.trim().to_ascii_lowercase();
            let parsed = match text.as_str() {
                "inf" | "+inf" | "infinity" | "+infinity" => Some(f64::INFINITY),
                "-inf" | "-infinity" => Some(f64::NEG_INFINITY),
                "nan" | "+nan" | "-nan" => Some(f64::NAN),
                _ => text.parse::<f64>().ok(),
            };
            parsed.map(Object::Float).ok_or_else(|| {
                Fault::value_error(format!("could not convert string to float: {}", describe(value)))
            })
        }
        other => Err(Fault::type_error(format!(
            "float() argument must be a string or a real number, not '{}'",
            other.type_name()
        ))),
    }
}

fn is_instance(obj: &Object, class: &Object) -> Result<bool> {
    match class {
        Object::Tuple(classes) => {
            for class in classes.iter() {
                if is_instance(obj, class)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Object::Builtin(builtin) if builtin.is_type() => Ok(matches!(
            (builtin, obj),
            (Builtin::Int, Object::Int(_) | Object::Bool(_))
                | (Builtin::Float, Object::Float(_))
                | (Builtin::Str, Object::Str(_))
                | (Builtin::Bool, Object::Bool(_))
                | (Builtin::List, Object::List(_))
                | (Builtin::Tuple, Object::Tuple(_))
                | (Builtin::Dict, Object::Dict(_))
                | (Builtin::Range, Object::Range(..))
        )),
        Object::ExceptionType(base) => {
            Ok(matches!(obj, Object::Exception(exc) if is_subclass(exc.kind, base)))
        }
        _ => Err(Fault::type_error(
            "isinstance() arg 2 must be a type or tuple of types",
        )),
    }
}

fn gcd(a: i64, b: i64) -> Result<i64> {
    let (mut a, mut b) = (a.unsigned_abs(), b.unsigned_abs());
    while b != 0 {
        (a, b) = (b, a % b);
    }
    i64::try_from(a).map_err(|_| Fault::overflow())
}

/// Index into `len` items with Python's negative-index rule.
fn resolve_index(index: i64, len: usize) -> Option<usize> {
    let len = len as i64;
    let i = if index < 0 { index + len } else { index };
    (0..len).contains(&i).then(|| i as usize)
}

/// Byte offset of the `n`th char, clamped to the end.
fn char_offset(s: &str, n: usize) -> usize {
    s.char_indices().nth(n).map_or(s.len(), |(i, _)| i)
}

fn split_whitespace_max(s: &str, maxsplit: usize) -> Vec<Object> {
    let mut parts = Vec::new();
    let mut rest = s.trim_start();
    while !rest.is_empty() {
        if parts.len() == maxsplit {
            parts.push(Object::str(rest));
            break;
        }
        match rest.find(char::is_whitespace) {
            Some(i) => {
                parts.push(Object::str(&rest[..i]));
                rest = rest[i..].trim_start();
            }
            None => {
                parts.push(Object::str(rest));
                break;
            }
        }
    }
    parts
}

fn pad_str(s: &str, width: i64, fill: char, align: char) -> String {
    let len = s.chars().count() as i64;
    if width <= len {
        return s.to_owned();
    }
    let total = (width - len) as usize;
    let (left, right) = match align {
        '<' => (0, total),
        '>' => (total, 0),
        _ => {
            let left = total / 2 + (total & width as usize & 1);
            (left, total - left)
        }
    };
    let fill = fill.to_string();
    format!("{}{}{}", fill.repeat(left), s, fill.repeat(right))
}

fn fill_char(obj: Option<&Object>) -> Result<char> {
    match obj {
        None => Ok(' '),
        Some(Object::Str(s)) if s.chars().count() == 1 => Ok(s.chars().next().unwrap_or(' ')),
        Some(_) => Err(Fault::type_error(
            "The fill character must be exactly one character long",
        )),
    }
}

fn cased_all(s: &str, pred: fn(char) -> bool) -> bool {
    let mut cased = false;
    for c in s.chars() {
        if c.is_uppercase() || c.is_lowercase() {
            if !pred(c) {
                return false;
            }
            cased = true;
        }
    }
    cased
}

fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_cased = false;
    for c in s.chars() {
        if prev_cased {
            out.extend(c.to_lowercase());
        } else {
            out.extend(c.to_uppercase());
        }
        prev_cased = c.is_alphabetic();
    }
    out
}

impl<'i> Interpreter<'i> {
    pub(super) fn call_builtin(
        &mut self,
        builtin: Builtin,
        args: Vec<Object>,
        mut kwargs: Kwargs,
    ) -> Result<Object> {
        let name = builtin.name();
        match builtin {
            Builtin::Print => {
                let sep = opt_str("sep", take_kwarg(&mut kwargs, "sep"), " ")?;
                let end = opt_str("end", take_kwarg(&mut kwargs, "end"), "\n")?;
                no_kwargs(name, &kwargs)?;
                let mut line = String::new();
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        line.push_str(&sep);
                    }
                    let room = self.output_room().saturating_sub(line.len());
                    let text = str_within(arg, room).ok_or_else(|| self.output_exceeded())?;
                    line.push_str(&text);
                }
                line.push_str(&end);
                self.write(&line)?;
                Ok(Object::None)
            }
            Builtin::Input => {
                no_kwargs(name, &kwargs)?;
                arity(name, &args, 0, 1)?;
                if let Some(prompt) = args.first() {
                    let text = str_within(prompt, self.output_room()).ok_or_else(|| self.output_exceeded())?;
                    self.write(&text)?;
                }
                match self.read_line() {
                    Some(line) => Ok(Object::str(line)),
                    None => Err(Fault::raise("EOFError", "EOF when reading a line")),
                }
            }
            Builtin::Len => {
                no_kwargs(name, &kwargs)?;
                arity(name, &args, 1, 1)?;
                Ok(Object::Int(ops::len_of(&args[0])? as i64))
            }
            Builtin::Min | Builtin::Max => self.min_max(builtin, args, kwargs),
            Builtin::Sum => {
                let start = arg_or_kwarg(&args, 1, &mut kwargs, "start").unwrap_or(Object::Int(0));
                no_kwargs(name, &kwargs)?;
                arity(name, &args, 1, 2)?;
                if let Object::Str(_) = start {
                    return Err(Fault::type_error(
                        "sum() can't sum strings [use ''.join(seq) instead]",
                    ));
                }
                let mut total = start;
                for item in self.collect(&args[0])? {
                    total = ops::binary(BinOp::Add, &total, &item, self.limits.max_len)?;
                }
                Ok(total)
            }
            Builtin::Sorted => {
                let key = take_kwarg(&mut kwargs, "key");
                let reverse = take_kwarg(&mut kwargs, "reverse");
                no_kwargs(name, &kwargs)?;
                arity(name, &args, 1, 1)?;
                let items = self.collect(&args[0])?;
                let reverse = reverse.map_or(false, |r| r.truthy());
                Ok(Object::list(self.sort_objects(items, key, reverse)?))
            }
            Builtin::Reversed => {
                no_kwargs(name, &kwargs)?;
                arity(name, &args, 1, 1)?;
                let mut items = self.collect(&args[0])?;
                items.reverse();
                Ok(Object::list(items))
            }
            Builtin::Abs => {
                no_kwargs(name, &kwargs)?;
                arity(name, &args, 1, 1)?;
                match &args[0] {
                    Object::Int(n) => n.checked_abs().map(Object::Int).ok_or_else(Fault::overflow),
                    Object::Bool(b) => Ok(Object::Int(i64::from(*b))),
                    Object::Float(x) => Ok(Object::Float(x.abs())),
                    other => Err(Fault::type_error(format!(
                        "bad operand type for abs(): '{}'",
                        other.type_name()
                    ))),
                }
            }
            Builtin::Round => {
                let ndigits = arg_or_kwarg(&args, 1, &mut kwargs, "ndigits");
                no_kwargs(name, &kwargs)?;
                arity(name, &args, 1, 2)?;
                round(&args[0], ndigits.as_ref())
            }
            Builtin::Int => {
                let base = arg_or_kwarg(&args, 1, &mut kwargs, "base");
                no_kwargs(name, &kwargs)?;
                arity(name, &args, 0, 2)?;
                let base = base.as_ref().map(int_arg).transpose()?;
                match args.first() {
                    Some(value) => to_int(value, base),
                    None => Ok(Object::Int(0)),
                }
            }
            Builtin::Float => {
                no_kwargs(name, &kwargs)?;
                arity(name, &args, 0, 1)?;
                match args.first() {
                    Some(value) => to_float(value),
                    None => Ok(Object::Float(0.0)),
                }
            }
            Builtin::Str => {
                no_kwargs(name, &kwargs)?;
                arity(name, &args, 0, 1)?;
                match args.first() {
                    Some(value) => Ok(Object::Str(to_str(value)?.into())),
                    None => Ok(Object::str("")),
                }
            }
            Builtin::Repr => {
                no_kwargs(name, &kwargs)?;
                arity(name, &args, 1, 1)?;
                Ok(Object::Str(repr(&args[0])?.into()))
            }
            Builtin::Bool => {
                no_kwargs(name, &kwargs)?;
                arity(name, &args, 0, 1)?;
                Ok(Object::Bool(args.first().map_or(false, Object::truthy)))
            }
            Builtin::List | Builtin::Tuple => {
                no_kwargs(name, &kwargs)?;
                arity(name, &args, 0, 1)?;
                let items = match args.first() {
                    Some(iterable) => self.collect(iterable)?,
                    None => Vec::new(),
                };
                Ok(if builtin == Builtin::List {
                    Object::list(items)
                } else {
                    Object::tuple(items)
                })
            }
            Builtin::Dict => {
                arity(name, &args, 0, 1)?;
                let mut entries = Vec::new();
                if let Some(source) = args.first() {
                    self.merge_into(&mut entries, source)?;
                }
                for (key, value) in kwargs {
                    ops::dict_insert(&mut entries, Object::str(&key), value);
                }
                Ok(Object::dict(entries))
            }
            Builtin::Range => {
                no_kwargs(name, &kwargs)?;
                arity(name, &args, 1, 3)?;
                let bounds = args.iter().map(int_arg).collect::<Result<Vec<i64>>>()?;
                let (start, stop, step) = match bounds[..] {
                    [stop] => (0, stop, 1),
                    [start, stop] => (start, stop, 1),
                    [start, stop, step] => (start, stop, step),
                    _ => return Err(Fault::type_error("range expected at most 3 arguments")),
                };
                if step == 0 {
                    return Err(Fault::value_error("range() arg 3 must not be zero"));
                }
                Ok(Object::Range(start, stop, step))
            }
            Builtin::Enumerate => {
                let start = arg_or_kwarg(&args, 1, &mut kwargs, "start");
                no_kwargs(name, &kwargs)?;
                arity(name, &args, 1, 2)?;
                let start = start.as_ref().map(int_arg).transpose()?.unwrap_or(0);
                let items = self.collect(&args[0])?;
                let mut pairs = Vec::with_capacity(items.len());
                for (i, item) in items.into_iter().enumerate() {
                    let index = start.checked_add(i as i64).ok_or_else(Fault::overflow)?;
                    pairs.push(Object::tuple(vec![Object::Int(index), item]));
                }
                Ok(Object::list(pairs))
            }
            Builtin::Zip => {
                no_kwargs(name, &kwargs)?;
                let mut columns = Vec::with_capacity(args.len());
                for iterable in &args {
                    columns.push(self.collect(iterable)?);
                }
                let rows = columns.iter().map(Vec::len).min().unwrap_or(0);
                Ok(Object::list(
                    (0..rows)
                        .map(|i| Object::tuple(columns.iter().map(|c| c[i].clone()).collect()))
                        .collect(),
                ))
            }
            Builtin::Ord => {
                no_kwargs(name, &kwargs)?;
                arity(name, &args, 1, 1)?;
                match &args[0] {
                    Object::Str(s) => {
                        let mut chars = s.chars();
                        match (chars.next(), chars.next()) {
                            (Some(c), None) => Ok(Object::Int(i64::from(u32::from(c)))),
                            _ => Err(Fault::type_error(format!(
                                "ord() expected a character, but string of length {} found",
                                s.chars().count()
                            ))),
                        }
                    }
                    other => Err(Fault::type_error(format!(
                        "ord() expected string of length 1, but {} found",
                        other.type_name()
                    ))),
                }
            }
            Builtin::Chr => {
                no_kwargs(name, &kwargs)?;
                arity(name, &args, 1, 1)?;
                let code = int_arg(&args[0])?;
                u32::try_from(code)
                    .ok()
                    .and_then(char::from_u32)
                    .map(|c| Object::str(c.encode_utf8(&mut [0; 4])))
                    .ok_or_else(|| Fault::value_error("chr() arg not in range(0x110000)"))
            }
            Builtin::Any | Builtin::All => {
                no_kwargs(name, &kwargs)?;
                arity(name, &args, 1, 1)?;
                let wanted = builtin == Builtin::Any;
                for item in self.collect(&args[0])? {
                    if item.truthy() == wanted {
                        return Ok(Object::Bool(wanted));
                    }
                }
                Ok(Object::Bool(!wanted))
            }
            Builtin::Isinstance => {
                no_kwargs(name, &kwargs)?;
                arity(name, &args, 2, 2)?;
                Ok(Object::Bool(is_instance(&args[0], &args[1])?))
            }
            _ => self.call_math(builtin, args, kwargs),
        }
    }

    fn call_math(&mut self, builtin: Builtin, args: Vec<Object>, mut kwargs: Kwargs) -> Result<Object> {
        let name = builtin.name();
        match builtin {
            Builtin::Sqrt => {
                no_kwargs(name, &kwargs)?;
                arity(name, &args, 1, 1)?;
                let x = float_arg(&args[0])?;
                if x < 0.0 {
                    return Err(domain_error());
                }
                Ok(Object::Float(x.sqrt()))
            }
            Builtin::Floor | Builtin::Ceil => {
                no_kwargs(name, &kwargs)?;
                arity(name, &args, 1, 1)?;
                match &args[0] {
                    Object::Int(n) => Ok(Object::Int(*n)),
                    other => {
                        let x = float_arg(other)?;
                        float_to_int(if builtin == Builtin::Floor {
                            x.floor()
                        } else {
                            x.ceil()
                        })
                    }
                }
            }
            Builtin::Pow => {
                no_kwargs(name, &kwargs)?;
                arity(name, &args, 2, 2)?;
                let (x, y) = (float_arg(&args[0])?, float_arg(&args[1])?);
                if (x == 0.0 && y < 0.0) || (x < 0.0 && y.is_finite() && y.fract() != 0.0) {
                    return Err(domain_error());
                }
                let result = x.powf(y);
                if result.is_infinite() && x.is_finite() && y.is_finite() {
                    return Err(Fault::raise("OverflowError", "math range error"));
                }
                Ok(Object::Float(result))
            }
            Builtin::Fabs => {
                no_kwargs(name, &kwargs)?;
                arity(name, &args, 1, 1)?;
                Ok(Object::Float(float_arg(&args[0])?.abs()))
            }
            Builtin::Exp => {
                no_kwargs(name, &kwargs)?;
                arity(name, &args, 1, 1)?;
                let x = float_arg(&args[0])?;
                let result = x.exp();
                if result.is_infinite() && x.is_finite() {
                    return Err(Fault::raise("OverflowError", "math range error"));
                }
                Ok(Object::Float(result))
            }
            Builtin::Log | Builtin::Log10 => {
                no_kwargs(name, &kwargs)?;
                let max = if builtin == Builtin::Log { 2 } else { 1 };
                arity(name, &args, 1, max)?;
                let x = float_arg(&args[0])?;
                if x <= 0.0 {
                    return Err(domain_error());
                }
                if builtin == Builtin::Log10 {
                    return Ok(Object::Float(x.log10()));
                }
                match args.get(1) {
                    None => Ok(Object::Float(x.ln())),
                    Some(base) => {
                        let base = float_arg(base)?;
                        if base <= 0.0 {
                            return Err(domain_error());
                        }
                        if base == 1.0 {
                            return Err(Fault::zero_division("float division by zero"));
                        }
                        Ok(Object::Float(x.ln() / base.ln()))
                    }
                }
            }
            Builtin::Gcd => {
                no_kwargs(name, &kwargs)?;
                let mut result = 0;
                for arg in &args {
                    result = gcd(result, int_arg(arg)?)?;
                }
                Ok(Object::Int(result))
            }
            Builtin::Factorial => {
                no_kwargs(name, &kwargs)?;
                arity(name, &args, 1, 1)?;
                let n = int_arg(&args[0])?;
                if n < 0 {
                    return Err(Fault::value_error(
                        "factorial() not defined for negative values",
                    ));
                }
                (1..=n)
                    .try_fold(1i64, |acc, k| acc.checked_mul(k))
                    .map(Object::Int)
                    .ok_or_else(Fault::overflow)
            }
            Builtin::Isclose => {
                let rel_tol = take_kwarg(&mut kwargs, "rel_tol");
                let abs_tol = take_kwarg(&mut kwargs, "abs_tol");
                no_kwargs(name, &kwargs)?;
                arity(name, &args, 2, 2)?;
                let rel_tol = rel_tol.as_ref().map(float_arg).transpose()?.unwrap_or(1e-9);
                let abs_tol = abs_tol.as_ref().map(float_arg).transpose()?.unwrap_or(0.0);
                if rel_tol < 0.0 || abs_tol < 0.0 {
                    return Err(Fault::value_error("tolerances must be non-negative"));
                }
                let (a, b) = (float_arg(&args[0])?, float_arg(&args[1])?);
                if a == b {
                    return Ok(Object::Bool(true));
                }
                if a.is_infinite() || b.is_infinite() {
                    return Ok(Object::Bool(false));
                }
                let diff = (b - a).abs();
                Ok(Object::Bool(
                    diff <= (rel_tol * b.abs()).max(rel_tol * a.abs()) || diff <= abs_tol,
                ))
            }
            _ => Err(Fault::type_error(format!("'{}' is not callable here", name))),
        }
    }

    fn min_max(&mut self, builtin: Builtin, args: Vec<Object>, mut kwargs: Kwargs) -> Result<Object> {
        let name = builtin.name();
        let key = take_kwarg(&mut kwargs, "key").filter(|k| !matches!(k, Object::None));
        let default = take_kwarg(&mut kwargs, "default");
        no_kwargs(name, &kwargs)?;
        let items = match args.len() {
            0 => {
                return Err(Fault::type_error(format!(
                    "{}() expected at least 1 argument, got 0",
                    name
                )))
            }
            1 => self.collect(&args[0])?,
            _ => args,
        };
        let wanted = if builtin == Builtin::Max {
            Ordering::Greater
        } else {
            Ordering::Less
        };
        let mut best: Option<(Object, Object)> = None;
        for item in items {
            let rank = match &key {
                Some(key) => self.call(key, vec![item.clone()], Vec::new())?,
                None => item.clone(),
            };
            let better = match &best {
                None => true,
                Some((best_rank, _)) => ops::py_cmp(&rank, best_rank)? == wanted,
            };
            if better {
                best = Some((rank, item));
            }
        }
        match (best, default) {
            (Some((_, item)), _) => Ok(item),
            (None, Some(default)) => Ok(default),
            (None, None) => Err(Fault::value_error(format!(
                "{}() arg is an empty sequence",
                name
            ))),
        }
    }

    /// Stable sort through a fallible comparator; the first comparison error wins.
    pub(super) fn sort_objects(
        &mut self,
        items: Vec<Object>,
        key: Option<Object>,
        reverse: bool,
    ) -> Result<Vec<Object>> {
        self.charge(items.len() as u64)?;
        let key = key.filter(|k| !matches!(k, Object::None));
        let mut keyed = Vec::with_capacity(items.len());
        for item in items {
            let rank = match &key {
                Some(key) => self.call(key, vec![item.clone()], Vec::new())?,
                None => item.clone(),
            };
            keyed.push((rank, item));
        }
        let mut failure = None;
        keyed.sort_by(|(a, _), (b, _)| {
            let ordering = if reverse {
                ops::py_cmp(b, a)
            } else {
                ops::py_cmp(a, b)
            };
            ordering.unwrap_or_else(|err| {
                failure.get_or_insert(err);
                Ordering::Equal
            })
        });
        if let Some(err) = failure {
            return Err(err);
        }
        Ok(keyed.into_iter().map(|(_, item)| item).collect())
    }

    /// Adds the pairs of a mapping or an iterable of pairs.
    fn merge_into(&mut self, entries: &mut Vec<(Object, Object)>, source: &Object) -> Result<()> {
        if let Object::Dict(other) = source {
            let pairs = other.borrow().clone();
            for (key, value) in pairs {
                ops::dict_insert(entries, key, value);
            }
            return Ok(());
        }
        for (i, pair) in self.collect(source)?.into_iter().enumerate() {
            let kv = self.collect(&pair).map_err(|_| {
                Fault::type_error(format!(
                    "cannot convert dictionary update sequence element #{} to a sequence",
                    i
                ))
            })?;
            if kv.len() != 2 {
                return Err(Fault::value_error(format!(
                    "dictionary update sequence element #{} has length {}; 2 is required",
                    i,
                    kv.len()
                )));
            }
            let mut kv = kv.into_iter();
            if let (Some(key), Some(value)) = (kv.next(), kv.next()) {
                ops::check_hashable(&key)?;
                ops::dict_insert(entries, key, value);
            }
            self.check_len(entries.len())?;
        }
        Ok(())
    }

    pub(super) fn call_method(
        &mut self,
        receiver: &Object,
        name: &str,
        args: Vec<Object>,
        kwargs: Kwargs,
    ) -> Result<Object> {
        match receiver {
            Object::Str(s) => self.str_method(s, name, args, kwargs),
            Object::List(list) => self.list_method(list, name, args, kwargs),
            Object::Dict(dict) => self.dict_method(dict, name, args, kwargs),
            other => Err(Fault::attribute(other.type_name(), name)),
        }
    }

    fn str_method(&mut self, s: &Rc<str>, name: &str, args: Vec<Object>, mut kwargs: Kwargs) -> Result<Object> {
        if name == "format" {
            let text = format_fields(s, &args, &kwargs)?;
            self.check_len(text.chars().count())?;
            return Ok(Object::Str(text.into()));
        }
        if name == "split" {
            let sep = arg_or_kwarg(&args, 0, &mut kwargs, "sep");
            let maxsplit = arg_or_kwarg(&args, 1, &mut kwargs, "maxsplit");
            no_kwargs(name, &kwargs)?;
            arity(name, &args, 0, 2)?;
            let maxsplit = maxsplit.as_ref().map(int_arg).transpose()?.unwrap_or(-1);
            let limit = usize::try_from(maxsplit).unwrap_or(usize::MAX);
            let parts = match sep {
                None | Some(Object::None) => split_whitespace_max(s, limit),
                Some(sep) => {
                    let sep = str_arg(name, &sep)?;
                    if sep.is_empty() {
                        return Err(Fault::value_error("empty separator"));
                    }
                    s.splitn(limit.saturating_add(1), sep).map(Object::str).collect()
                }
            };
            return Ok(Object::list(parts));
        }
        no_kwargs(name, &kwargs)?;

        let text: &str = s;
        let result = match name {
            "upper" | "lower" | "title" | "capitalize" => {
                arity(name, &args, 0, 0)?;
                let out = match name {
                    "upper" => text.to_uppercase(),
                    "lower" => text.to_lowercase(),
                    "title" => title_case(text),
                    _ => {
                        let mut chars = text.chars();
                        match chars.next() {
                            Some(first) => first.to_uppercase().chain(chars.as_str().to_lowercase().chars()).collect(),
                            None => String::new(),
                        }
                    }
                };
                Object::Str(out.into())
            }
            "strip" | "lstrip" | "rstrip" => {
                arity(name, &args, 0, 1)?;
                let chars = match args.first() {
                    None | Some(Object::None) => None,
                    Some(other) => Some(str_arg(name, other)?),
                };
                let strip = |c: char| match chars {
                    Some(set) => set.contains(c),
                    None => c.is_whitespace(),
                };
                Object::str(match name {
                    "strip" => text.trim_matches(strip),
                    "lstrip" => text.trim_start_matches(strip),
                    _ => text.trim_end_matches(strip),
                })
            }
            "join" => {
                arity(name, &args, 1, 1)?;
                let items = self.collect(&args[0])?;
                let mut parts = Vec::with_capacity(items.len());
                let mut total = 0;
                for (i, item) in items.iter().enumerate() {
                    match item {
                        Object::Str(part) => {
                            total += part.chars().count();
                            parts.push(&**part);
                        }
                        other => {
                            return Err(Fault::type_error(format!(
                                "sequence item {}: expected str instance, {} found",
                                i,
                                other.type_name()
                            )))
                        }
                    }
                }
                let sep_len = text.chars().count() * parts.len().saturating_sub(1);
                self.check_len(total + sep_len)?;
                Object::Str(parts.join(text).into())
            }
            "replace" => {
                arity(name, &args, 2, 3)?;
                let old = str_arg(name, &args[0])?;
                let new = str_arg(name, &args[1])?;
                let count = args.get(2).map(int_arg).transpose()?.unwrap_or(-1);
                let found = if old.is_empty() {
                    text.chars().count() + 1
                } else {
                    text.matches(old).count()
                };
                let hits = usize::try_from(count).map_or(found, |c| c.min(found));
                let grown = text.chars().count() - hits * old.chars().count()
                    + hits.saturating_mul(new.chars().count());
                self.check_len(grown)?;
                Object::Str(match usize::try_from(count) {
                    Ok(count) => text.replacen(old, new, count),
                    Err(_) => text.replace(old, new),
                }
                .into())
            }
            "startswith" | "endswith" => {
                arity(name, &args, 1, 1)?;
                let test = |affix: &str| {
                    if name == "startswith" {
                        text.starts_with(affix)
                    } else {
                        text.ends_with(affix)
                    }
                };
                let hit = match &args[0] {
                    Object::Tuple(affixes) => {
                        let mut hit = false;
                        for affix in affixes.iter() {
                            hit |= test(str_arg(name, affix)?);
                        }
                        hit
                    }
                    other => test(str_arg(name, other)?),
                };
                Object::Bool(hit)
            }
            "find" | "index" => {
                arity(name, &args, 1, 2)?;
                let sub = str_arg(name, &args[0])?;
                let start = args.get(1).map(int_arg).transpose()?.unwrap_or(0);
                let len = text.chars().count() as i64;
                let start = (if start < 0 { (start + len).max(0) } else { start.min(len) }) as usize;
                let from = char_offset(text, start);
                match text[from..].find(sub) {
                    Some(at) => Object::Int((start + text[from..from + at].chars().count()) as i64),
                    None if name == "find" => Object::Int(-1),
                    None => return Err(Fault::value_error("substring not found")),
                }
            }
            "count" => {
                arity(name, &args, 1, 1)?;
                let sub = str_arg(name, &args[0])?;
                let n = if sub.is_empty() {
                    text.chars().count() + 1
                } else {
                    text.matches(sub).count()
                };
                Object::Int(n as i64)
            }
            "isdigit" | "isalpha" | "isalnum" | "isspace" => {
                arity(name, &args, 0, 0)?;
                let pred: fn(char) -> bool = match name {
                    "isdigit" => char::is_numeric,
                    "isalpha" => char::is_alphabetic,
                    "isalnum" => char::is_alphanumeric,
                    _ => char::is_whitespace,
                };
                Object::Bool(!text.is_empty() && text.chars().all(pred))
            }
            "isupper" => {
                arity(name, &args, 0, 0)?;
                Object::Bool(cased_all(text, char::is_uppercase))
            }
            "islower" => {
                arity(name, &args, 0, 0)?;
                Object::Bool(cased_all(text, char::is_lowercase))
            }
            "zfill" => {
                arity(name, &args, 1, 1)?;
                let width = int_arg(&args[0])?;
                self.check_len(usize::try_from(width).unwrap_or(0))?;
                let (sign, digits) = match text.chars().next() {
                    Some(c @ ('+' | '-')) => (Some(c), &text[1..]),
                    _ => (None, text),
                };
                let padded = pad_str(digits, width - i64::from(sign.is_some()), '0', '>');
                Object::Str(sign.into_iter().chain(padded.chars()).collect::<String>().into())
            }
            "center" | "ljust" | "rjust" => {
                arity(name, &args, 1, 2)?;
                let width = int_arg(&args[0])?;
                self.check_len(usize::try_from(width).unwrap_or(0))?;
                let fill = fill_char(args.get(1))?;
                let align = match name {
                    "ljust" => '<',
                    "rjust" => '>',
                    _ => '^',
                };
                Object::Str(pad_str(text, width, fill, align).into())
            }
            _ => return Err(Fault::attribute("str", name)),
        };
        Ok(result)
    }

    fn list_method(&mut self, list: &ListRef, name: &str, args: Vec<Object>, mut kwargs: Kwargs) -> Result<Object> {
        if name == "sort" {
            let key = take_kwarg(&mut kwargs, "key");
            let reverse = take_kwarg(&mut kwargs, "reverse").map_or(false, |r| r.truthy());
            no_kwargs(name, &kwargs)?;
            arity(name, &args, 0, 0)?;
            let items = list.borrow().clone();
            let sorted = self.sort_objects(items, key, reverse)?;
            *list.borrow_mut() = sorted;
            return Ok(Object::None);
        }
        no_kwargs(name, &kwargs)?;

        match name {
            "append" => {
                arity(name, &args, 1, 1)?;
                let len = list.borrow().len();
                self.check_len(len + 1)?;
                self.alloc(SLOT)?;
                list.borrow_mut().push(args[0].clone());
                Ok(Object::None)
            }
            "extend" => {
                arity(name, &args, 1, 1)?;
                let extra = self.collect(&args[0])?;
                let len = list.borrow().len();
                self.check_len(len + extra.len())?;
                self.alloc(extra.len() * SLOT)?;
                list.borrow_mut().extend(extra);
                Ok(Object::None)
            }
            "pop" => {
                arity(name, &args, 0, 1)?;
                let index = args.first().map(int_arg).transpose()?.unwrap_or(-1);
                let mut items = list.borrow_mut();
                if items.is_empty() {
                    return Err(Fault::index_error("pop from empty list"));
                }
                let i = resolve_index(index, items.len())
                    .ok_or_else(|| Fault::index_error("pop index out of range"))?;
                Ok(items.remove(i))
            }
            "insert" => {
                arity(name, &args, 2, 2)?;
                let index = int_arg(&args[0])?;
                let len = list.borrow().len();
                self.check_len(len + 1)?;
                self.alloc(SLOT)?;
                let len = len as i64;
                let at = if index < 0 { (index + len).max(0) } else { index.min(len) };
                list.borrow_mut().insert(at as usize, args[1].clone());
                Ok(Object::None)
            }
            "remove" => {
                arity(name, &args, 1, 1)?;
                let mut items = list.borrow_mut();
                match items.iter().position(|item| ops::py_eq(item, &args[0])) {
                    Some(i) => {
                        items.remove(i);
                        Ok(Object::None)
                    }
                    None => Err(Fault::value_error("list.remove(x): x not in list")),
                }
            }
            "index" => {
                arity(name, &args, 1, 1)?;
                let items = list.borrow();
                match items.iter().position(|item| ops::py_eq(item, &args[0])) {
                    Some(i) => Ok(Object::Int(i as i64)),
                    None => Err(Fault::value_error(format!(
                        "{} is not in list",
                        describe(&args[0])
                    ))),
                }
            }
            "count" => {
                arity(name, &args, 1, 1)?;
                let n = list.borrow().iter().filter(|item| ops::py_eq(item, &args[0])).count();
                Ok(Object::Int(n as i64))
            }
            "reverse" => {
                arity(name, &args, 0, 0)?;
                list.borrow_mut().reverse();
                Ok(Object::None)
            }
            "copy" => {
                arity(name, &args, 0, 0)?;
                let items = list.borrow().clone();
                Ok(Object::list(items))
            }
            "clear" => {
                arity(name, &args, 0, 0)?;
                list.borrow_mut().clear();
                Ok(Object::None)
            }
            _ => Err(Fault::attribute("list", name)),
        }
    }

    fn dict_method(&mut self, dict: &DictRef, name: &str, args: Vec<Object>, kwargs: Kwargs) -> Result<Object> {
        if name == "update" {
            arity(name, &args, 0, 1)?;
            let mut entries = dict.borrow().clone();
            if let Some(source) = args.first() {
                self.merge_into(&mut entries, source)?;
            }
            for (key, value) in kwargs {
                ops::dict_insert(&mut entries, Object::str(&key), value);
            }
            self.check_len(entries.len())?;
            let grown = entries.len().saturating_sub(dict.borrow().len());
            self.alloc(grown * 2 * SLOT)?;
            *dict.borrow_mut() = entries;
            return Ok(Object::None);
        }
        no_kwargs(name, &kwargs)?;

        let position = |key: &Object| dict.borrow().iter().position(|(k, _)| ops::py_eq(k, key));
        match name {
            "get" => {
                arity(name, &args, 1, 2)?;
                ops::check_hashable(&args[0])?;
                Ok(match position(&args[0]) {
                    Some(i) => dict.borrow()[i].1.clone(),
                    None => args.get(1).cloned().unwrap_or(Object::None),
                })
            }
            "keys" | "values" | "items" => {
                arity(name, &args, 0, 0)?;
                let entries = dict.borrow();
                let items = entries
                    .iter()
                    .map(|(k, v)| match name {
                        "keys" => k.clone(),
                        "values" => v.clone(),
                        _ => Object::tuple(vec![k.clone(), v.clone()]),
                    })
                    .collect();
                Ok(Object::list(items))
            }
            "pop" => {
                arity(name, &args, 1, 2)?;
                ops::check_hashable(&args[0])?;
                match position(&args[0]) {
                    Some(i) => Ok(dict.borrow_mut().remove(i).1),
                    None => args
                        .get(1)
                        .cloned()
                        .ok_or_else(|| Fault::raise("KeyError", describe(&args[0]))),
                }
            }
            "setdefault" => {
                arity(name, &args, 1, 2)?;
                ops::check_hashable(&args[0])?;
                match position(&args[0]) {
                    Some(i) => Ok(dict.borrow()[i].1.clone()),
                    None => {
                        let len = dict.borrow().len();
                        self.check_len(len + 1)?;
                        self.alloc(2 * SLOT)?;
                        let value = args.get(1).cloned().unwrap_or(Object::None);
                        dict.borrow_mut().push((args[0].clone(), value.clone()));
                        Ok(value)
                    }
                }
            }
            "copy" => {
                arity(name, &args, 0, 0)?;
                let entries = dict.borrow().clone();
                Ok(Object::dict(entries))
            }
            "clear" => {
                arity(name, &args, 0, 0)?;
                dict.borrow_mut().clear();
                Ok(Object::None)
            }
            _ => Err(Fault::attribute("dict", name)),
        }
    }
}
