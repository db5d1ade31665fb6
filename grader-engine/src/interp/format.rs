use super::error::{Fault, Result};
use super::object::{Object, MAX_DEPTH};
use crate::value::{format_float, repr_str};

use std::fmt::Write as _;

/// Longest text `str()` and `repr()` will build, in bytes.
pub const MAX_TEXT: usize = 4 * 1024 * 1024;

pub fn to_str(obj: &Object) -> Result<String> {
    str_within(obj, MAX_TEXT).ok_or_else(Fault::memory)
}

pub fn repr(obj: &Object) -> Result<String> {
    repr_within(obj, MAX_TEXT).ok_or_else(Fault::memory)
}

/// `repr` for error messages. Values too large to show are elided.
pub fn describe(obj: &Object) -> String {
    repr_within(obj, MAX_TEXT).unwrap_or_else(|| "...".to_owned())
}

/// `str(obj)`, or `None` when it would be longer than `cap` bytes.
pub fn str_within(obj: &Object, cap: usize) -> Option<String> {
    match obj {
        Object::Str(s) if s.len() <= cap => Some(s.to_string()),
        Object::Exception(exc) if exc.message.len() <= cap => Some(exc.message.clone()),
        Object::Str(_) | Object::Exception(_) => None,
        other => repr_within(other, cap),
    }
}

/// `repr(obj)`, or `None` when it would be longer than `cap` bytes. Stops
/// writing as soon as the cap is passed, however large the object graph.
pub fn repr_within(obj: &Object, cap: usize) -> Option<String> {
    let mut out = String::new();
    if write_repr(&mut out, obj, 0, cap) && out.len() <= cap {
        Some(out)
    } else {
        None
    }
}

fn write_repr(out: &mut String, obj: &Object, depth: usize, cap: usize) -> bool {
    if out.len() > cap {
        return false;
    }
    if depth > MAX_DEPTH {
        out.push_str("...");
        return true;
    }
    let items = |out: &mut String, items: &[Object]| {
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            if !write_repr(out, item, depth + 1, cap) {
                return false;
            }
        }
        true
    };
    match obj {
        Object::None => out.push_str("None"),
        Object::Bool(true) => out.push_str("True"),
        Object::Bool(false) => out.push_str("False"),
        Object::Int(n) => {
            let _ = write!(out, "{}", n);
        }
        Object::Float(x) => out.push_str(&format_float(*x)),
        Object::Str(s) => {
            if out.len() + s.len() > cap {
                return false;
            }
            out.push_str(&repr_str(s));
        }
        Object::List(list) => {
            out.push('[');
            if !items(out, &list.borrow()) {
                return false;
            }
            out.push(']');
        }
        Object::Tuple(tuple) => {
            out.push('(');
            if !items(out, tuple) {
                return false;
            }
            if tuple.len() == 1 {
                out.push(',');
            }
            out.push(')');
        }
        Object::Dict(dict) => {
            out.push('{');
            for (i, (k, v)) in dict.borrow().iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                if !write_repr(out, k, depth + 1, cap) {
                    return false;
                }
                out.push_str(": ");
                if !write_repr(out, v, depth + 1, cap) {
                    return false;
                }
            }
            out.push('}');
        }
        Object::Range(start, stop, step) => {
            let _ = if *step == 1 {
                write!(out, "range({}, {})", start, stop)
            } else {
                write!(out, "range({}, {}, {})", start, stop, step)
            };
        }
        Object::Function(func) => {
            let _ = write!(out, "<function {}>", func.def.name);
        }
        Object::Builtin(b) if b.is_type() => {
            let _ = write!(out, "<class '{}'>", b.name());
        }
        Object::Builtin(b) => {
            let _ = write!(out, "<built-in function {}>", b.name());
        }
        Object::Method(recv, name) => {
            let _ = write!(out, "<built-in method {} of {} object>", name, recv.type_name());
        }
        Object::Module(name) => {
            let _ = write!(out, "<module '{}'>", name);
        }
        Object::Exception(exc) => {
            if out.len() + exc.message.len() > cap {
                return false;
            }
            let _ = write!(out, "{}({})", exc.kind, if exc.message.is_empty() {
                String::new()
            } else {
                repr_str(&exc.message)
            });
        }
        Object::ExceptionType(kind) => {
            let _ = write!(out, "<class '{}'>", kind);
        }
    }
    out.len() <= cap
}

#[derive(Debug, Default)]
struct Spec {
    fill: Option<char>,
    align: Option<char>,
    sign: Option<char>,
    zero: bool,
    width: usize,
    grouping: Option<char>,
    precision: Option<usize>,
    kind: Option<char>,
}

fn parse_spec(spec: &str) -> Result<Spec> {
    let invalid = || Fault::value_error("Invalid format specifier");
    let chars: Vec<char> = spec.chars().collect();
    let mut out = Spec::default();
    let mut i = 0;

    let is_align = |c: char| matches!(c, '<' | '>' | '^' | '=');
    if chars.len() >= 2 && is_align(chars[1]) {
        out.fill = Some(chars[0]);
        out.align = Some(chars[1]);
        i = 2;
    } else if !chars.is_empty() && is_align(chars[0]) {
        out.align = Some(chars[0]);
        i = 1;
    }
    if let Some(&c @ ('+' | '-' | ' ')) = chars.get(i) {
        out.sign = Some(c);
        i += 1;
    }
    if chars.get(i) == Some(&'0') {
        out.zero = true;
        i += 1;
    }
    let start = i;
    while chars.get(i).map_or(false, char::is_ascii_digit) {
        i += 1;
    }
    if i > start {
        let digits: String = chars[start..i].iter().collect();
        out.width = digits.parse().map_err(|_| invalid())?;
    }
    if let Some(&c @ (',' | '_')) = chars.get(i) {
        out.grouping = Some(c);
        i += 1;
    }
    if chars.get(i) == Some(&'.') {
        i += 1;
        let start = i;
        while chars.get(i).map_or(false, char::is_ascii_digit) {
            i += 1;
        }
        if i == start {
            return Err(Fault::value_error("Format specifier missing precision"));
        }
        let digits: String = chars[start..i].iter().collect();
        out.precision = Some(digits.parse().map_err(|_| invalid())?);
    }
    if i < chars.len() {
        out.kind = Some(chars[i]);
        i += 1;
    }
    if i != chars.len() {
        return Err(invalid());
    }
    Ok(out)
}

/// Applies a format specification such as `>8.2f` to a value.
pub fn format_spec(obj: &Object, spec: &str) -> Result<String> {
    if spec.is_empty() {
        return to_str(obj);
    }
    let spec = parse_spec(spec)?;
    let unknown = |kind: char| {
        Fault::value_error(format!(
            "Unknown format code '{}' for object of type '{}'",
            kind,
            obj.type_name()
        ))
    };

    let (sign, body) = match obj {
        Object::Int(_) | Object::Bool(_) | Object::Float(_) => {
            let x = match *obj {
                Object::Int(n) => Number::Int(n),
                Object::Bool(b) => Number::Int(b as i64),
                Object::Float(x) => Number::Float(x),
                _ => Number::Int(0),
            };
            let kind = spec.kind.unwrap_or(match x {
                Number::Int(_) => 'd',
                Number::Float(_) if spec.precision.is_some() => '\0',
                Number::Float(_) => 'r',
            });
            let negative = match x {
                Number::Int(n) => n < 0,
                Number::Float(f) => f.is_sign_negative() && !f.is_nan(),
            };
            let body = match (kind, x) {
                ('d', Number::Int(n)) => group(&n.unsigned_abs().to_string(), spec.grouping),
                ('x', Number::Int(n)) => format!("{:x}", n.unsigned_abs()),
                ('X', Number::Int(n)) => format!("{:X}", n.unsigned_abs()),
                ('o', Number::Int(n)) => format!("{:o}", n.unsigned_abs()),
                ('b', Number::Int(n)) => format!("{:b}", n.unsigned_abs()),
                ('n', Number::Int(n)) => n.unsigned_abs().to_string(),
                ('r', Number::Float(f)) => {
                    let text = format_float(f.abs());
                    if spec.grouping.is_some() {
                        group_fixed(&text, spec.grouping)
                    } else {
                        text
                    }
                }
                ('f' | 'F', x) => {
                    let text = format!("{:.*}", spec.precision.unwrap_or(6), x.as_f64().abs());
                    group_fixed(&text, spec.grouping)
                }
                ('e' | 'E', x) => {
                    let text = sci(x.as_f64().abs(), spec.precision.unwrap_or(6));
                    if kind == 'E' {
                        text.to_uppercase()
                    } else {
                        text
                    }
                }
                ('g' | 'G', x) => general(x.as_f64().abs(), spec.precision.unwrap_or(6), false),
                ('\0', Number::Float(f)) => general(f.abs(), spec.precision.unwrap_or(6), true),
                ('%', x) => {
                    let text = format!("{:.*}", spec.precision.unwrap_or(6), x.as_f64().abs() * 100.0);
                    format!("{}%", group_fixed(&text, spec.grouping))
                }
                (kind, _) => return Err(unknown(kind)),
            };
            let sign = if negative {
                "-"
            } else {
                match spec.sign {
                    Some('+') => "+",
                    Some(' ') => " ",
                    _ => "",
                }
            };
            (sign, body)
        }
        Object::Str(s) => {
            if let Some(kind) = spec.kind.filter(|&k| k != 's') {
                return Err(unknown(kind));
            }
            if spec.sign.is_some() {
                return Err(Fault::value_error("Sign not allowed in string format specifier"));
            }
            let body: String = match spec.precision {
                Some(p) => s.chars().take(p).collect(),
                None => s.to_string(),
            };
            return Ok(pad("", &body, &spec, '<'));
        }
        other => {
            return Err(Fault::type_error(format!(
                "unsupported format string passed to {}.__format__",
                other.type_name()
            )))
        }
    };
    Ok(pad(sign, &body, &spec, '>'))
}

#[derive(Debug, Clone, Copy)]
enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    fn as_f64(self) -> f64 {
        match self {
            Number::Int(n) => n as f64,
            Number::Float(x) => x,
        }
    }
}

fn pad(sign: &str, body: &str, spec: &Spec, default_align: char) -> String {
    let len = sign.chars().count() + body.chars().count();
    if len >= spec.width {
        return format!("{}{}", sign, body);
    }
    let missing = spec.width - len;
    let (fill, align) = if spec.zero && spec.align.is_none() {
        ('0', '=')
    } else {
        (spec.fill.unwrap_or(' '), spec.align.unwrap_or(default_align))
    };
    let fill_n = |n: usize| std::iter::repeat(fill).take(n).collect::<String>();
    match align {
        '<' => format!("{}{}{}", sign, body, fill_n(missing)),
        '^' => format!(
            "{}{}{}{}",
            fill_n(missing / 2),
            sign,
            body,
            fill_n(missing - missing / 2)
        ),
        '=' => format!("{}{}{}", sign, fill_n(missing), body),
        _ => format!("{}{}{}", fill_n(missing), sign, body),
    }
}

fn group(digits: &str, sep: Option<char>) -> String {
    let sep = match sep {
        Some(sep) => sep,
        None => return digits.to_owned(),
    };
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(sep);
        }
        out.push(c);
    }
    out
}

fn group_fixed(text: &str, sep: Option<char>) -> String {
    match text.split_once('.') {
        Some((int, frac)) => format!("{}.{}", group(int, sep), frac),
        None => group(text, sep),
    }
}

fn sci(x: f64, precision: usize) -> String {
    if !x.is_finite() {
        return format_float(x);
    }
    let text = format!("{:.*e}", precision, x);
    match text.split_once('e') {
        Some((mantissa, exp)) => {
            let exp: i32 = exp.parse().unwrap_or(0);
            format!("{}e{}{:02}", mantissa, if exp < 0 { '-' } else { '+' }, exp.abs())
        }
        None => text,
    }
}

/// `g` formatting; `keep_point` keeps one fractional digit on fixed output.
fn general(x: f64, precision: usize, keep_point: bool) -> String {
    if !x.is_finite() {
        return format_float(x);
    }
    let p = precision.max(1);
    if x == 0.0 {
        return if keep_point { "0.0" } else { "0" }.to_owned();
    }
    let exp = x.abs().log10().floor() as i32;
    let rounded = format!("{:.*e}", p - 1, x);
    let exp = rounded
        .split_once('e')
        .and_then(|(_, e)| e.parse::<i32>().ok())
        .unwrap_or(exp);
    let strip = |s: String| -> String {
        if s.contains('.') {
            s.trim_end_matches('0').trim_end_matches('.').to_owned()
        } else {
            s
        }
    };
    if exp < -4 || exp >= p as i32 {
        let text = sci(x, p - 1);
        match text.split_once('e') {
            Some((mantissa, exp)) => format!("{}e{}", strip(mantissa.to_owned()), exp),
            None => text,
        }
    } else {
        let mut text = strip(format!("{:.*}", (p as i32 - 1 - exp).max(0) as usize, x));
        if keep_point && !text.contains('.') {
            text.push_str(".0");
        }
        text
    }
}

/// `template % args`
pub fn percent_format(template: &str, args: &Object) -> Result<String> {
    let args: Vec<Object> = match args {
        Object::Tuple(items) => items.to_vec(),
        other => vec![other.clone()],
    };
    let mut args = args.into_iter();
    let mut out = String::new();
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        let mut flags = String::new();
        while let Some(&f @ ('-' | '+' | ' ' | '0' | '#')) = chars.peek() {
            flags.push(f);
            chars.next();
        }
        let mut width = String::new();
        while let Some(&d) = chars.peek().filter(|c| c.is_ascii_digit()) {
            width.push(d);
            chars.next();
        }
        let mut precision = None;
        if chars.peek() == Some(&'.') {
            chars.next();
            let mut digits = String::new();
            while let Some(&d) = chars.peek().filter(|c| c.is_ascii_digit()) {
                digits.push(d);
                chars.next();
            }
            precision = Some(digits);
        }
        let kind = chars
            .next()
            .ok_or_else(|| Fault::value_error("incomplete format"))?;
        if kind == '%' {
            out.push('%');
            continue;
        }

        let arg = args
            .next()
            .ok_or_else(|| Fault::type_error("not enough arguments for format string"))?;
        let mut spec = String::new();
        if flags.contains('-') {
            spec.push('<');
        }
        if flags.contains('+') {
            spec.push('+');
        } else if flags.contains(' ') {
            spec.push(' ');
        }
        if flags.contains('0') && !flags.contains('-') {
            spec.push('0');
        }
        spec.push_str(&width);
        if let Some(p) = &precision {
            spec.push('.');
            spec.push_str(if p.is_empty() { "0" } else { p });
        }

        let text = match kind {
            's' | 'r' => {
                let text = if kind == 's' { to_str(&arg)? } else { repr(&arg)? };
                format_spec(&Object::Str(text.into()), &spec)?
            }
            'd' | 'i' | 'u' => {
                let n = match arg {
                    Object::Float(x) if x.is_finite() => Object::Int(x.trunc() as i64),
                    Object::Int(_) | Object::Bool(_) => arg,
                    other => {
                        return Err(Fault::type_error(format!(
                            "%d format: a real number is required, not {}",
                            other.type_name()
                        )))
                    }
                };
                spec.push('d');
                format_spec(&n, &spec)?
            }
            'f' | 'F' | 'e' | 'E' | 'g' | 'G' | 'x' | 'X' | 'o' => {
                if !matches!(arg, Object::Int(_) | Object::Bool(_) | Object::Float(_)) {
                    return Err(Fault::type_error(format!(
                        "must be real number, not {}",
                        arg.type_name()
                    )));
                }
                spec.push(kind);
                format_spec(&arg, &spec)?
            }
            other => {
                return Err(Fault::value_error(format!(
                    "unsupported format character '{}'",
                    other
                )))
            }
        };
        out.push_str(&text);
    }

    if args.next().is_some() {
        return Err(Fault::type_error(
            "not all arguments converted during string formatting",
        ));
    }
    Ok(out)
}

/// `template.format(*args, **kwargs)`
pub fn format_fields(template: &str, args: &[Object], kwargs: &[(String, Object)]) -> Result<String> {
    let mut out = String::new();
    let mut chars = template.chars().peekable();
    let mut auto = 0usize;

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '}' => return Err(Fault::value_error("Single '}' encountered in format string")),
            '{' => {
                let mut field = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some('{') => {
                            return Err(Fault::value_error("nested replacement fields are not supported"))
                        }
                        Some(c) => field.push(c),
                        None => {
                            return Err(Fault::value_error("expected '}' before end of string"))
                        }
                    }
                }
                let (name, spec) = match field.split_once(':') {
                    Some((name, spec)) => (name, spec),
                    None => (field.as_str(), ""),
                };
                let (name, conversion) = match name.split_once('!') {
                    Some((name, conv)) => (name, conv.chars().next()),
                    None => (name, None),
                };

                let arg = if name.is_empty() {
                    let arg = args.get(auto);
                    auto += 1;
                    arg.ok_or_else(|| {
                        Fault::index_error(format!(
                            "Replacement index {} out of range for positional args tuple",
                            auto - 1
                        ))
                    })?
                } else if let Ok(index) = name.parse::<usize>() {
                    args.get(index).ok_or_else(|| {
                        Fault::index_error(format!(
                            "Replacement index {} out of range for positional args tuple",
                            index
                        ))
                    })?
                } else {
                    kwargs
                        .iter()
                        .find(|(k, _)| k == name)
                        .map(|(_, v)| v)
                        .ok_or_else(|| Fault::raise("KeyError", repr_str(name)))?
                };

                let text = match conversion {
                    Some('r') => format_spec(&Object::Str(repr(arg)?.into()), spec)?,
                    Some(_) | None => format_spec(arg, spec)?,
                };
                out.push_str(&text);
            }
            c => out.push(c),
        }
    }
    Ok(out)
}
