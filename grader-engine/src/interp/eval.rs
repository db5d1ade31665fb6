use super::ast::{Arg, BinOp, Comprehension, Expr, FPart, FuncDef, Handler, Stmt, StmtKind, Target};
use super::builtins::{self, Builtin};
use super::error::{exception_type, is_subclass, Exception, Fault, Result};
use super::format::{format_spec, repr, to_str};
use super::object::{Function, Object, Tracked, MAX_VALUE_NODES, SLOT};
use super::ops;
use super::Limits;
use crate::value::Value;

use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use std::time::Instant;

/// The wall clock is consulted once per this many steps.
const CLOCK_INTERVAL: u64 = 1024;

/// Bytes one entry of the tracking table takes.
const TRACKING: usize = 48;

pub(super) enum Flow {
    Normal,
    Break,
    Continue,
    Return(Object),
}

enum Scope {
    Function(Rc<Function>),
    Comprehension,
}

struct Frame {
    scope: Scope,
    locals: HashMap<String, Object>,
    globals: HashSet<String>,
}

impl Frame {
    fn is_function(&self) -> bool {
        matches!(self.scope, Scope::Function(_))
    }
}

type Emit<'a, 'i> = dyn FnMut(&mut Interpreter<'i>) -> Result<()> + 'a;

pub struct Interpreter<'i> {
    pub(super) limits: Limits,
    steps: u64,
    next_clock_check: u64,
    deadline: Instant,
    globals: HashMap<String, Object>,
    /// Global names in first-binding order.
    order: Vec<String>,
    frames: Vec<Frame>,
    /// Exceptions whose handlers are running, for bare `raise`.
    handling: Vec<Rc<Exception>>,
    output: String,
    stdin: std::str::Lines<'i>,
    depth: usize,
    /// Estimated bytes of objects built and not yet found dead.
    heap: usize,
    /// `heap` level that triggers the next sweep.
    sweep_at: usize,
    /// Every object the program built, by address, until a sweep finds it dead.
    tracked: HashMap<usize, Tracked>,
}

impl<'i> Interpreter<'i> {
    pub fn new(stdin: &'i str, limits: Limits) -> Self {
        Self {
            deadline: Instant::now() + limits.wall_time,
            sweep_at: limits.max_memory / 2,
            limits,
            steps: 0,
            next_clock_check: CLOCK_INTERVAL,
            globals: HashMap::new(),
            order: Vec::new(),
            frames: Vec::new(),
            handling: Vec::new(),
            output: String::new(),
            stdin: stdin.lines(),
            depth: 0,
            heap: 0,
            tracked: HashMap::new(),
        }
    }

    pub fn run(&mut self, program: &[Stmt]) -> Result<()> {
        self.exec_block(program).map(drop)
    }

    /// Global bindings that have a plain-data form. Bindings too large for
    /// what is left of the node budget are left out.
    pub fn bindings(&self) -> Vec<(String, Value)> {
        let mut budget = MAX_VALUE_NODES;
        self.order
            .iter()
            .filter_map(|name| {
                let mut attempt = budget;
                let value = self.globals.get(name)?.to_value_within(&mut attempt)?;
                budget = attempt;
                Some((name.clone(), value))
            })
            .collect()
    }

    pub fn into_printed(self) -> String {
        self.output
    }

    pub(super) fn charge(&mut self, steps: u64) -> Result<()> {
        self.steps = self.steps.saturating_add(steps);
        if self.steps > self.limits.step_limit {
            return Err(Fault::StepLimit);
        }
        if self.steps >= self.next_clock_check {
            self.next_clock_check = self.steps.saturating_add(CLOCK_INTERVAL);
            if Instant::now() >= self.deadline {
                return Err(Fault::WallTime);
            }
        }
        Ok(())
    }

    fn tick(&mut self) -> Result<()> {
        self.charge(1)
    }

    pub(super) fn check_len(&self, len: usize) -> Result<()> {
        ops::check_len(len, self.limits.max_len)
    }

    /// Charges `bytes` of new objects against the heap budget, sweeping
    /// first when the charge has grown enough since the last sweep.
    pub(super) fn alloc(&mut self, bytes: usize) -> Result<()> {
        self.heap = self.heap.saturating_add(bytes);
        if self.heap > self.sweep_at {
            self.sweep()?;
        }
        if self.heap > self.limits.max_memory {
            return Err(Fault::memory());
        }
        Ok(())
    }

    /// Tracks and charges a just-built object along with the direct children
    /// nothing else holds. Objects already held elsewhere were charged when
    /// they were built.
    fn fresh(&mut self, obj: &Object) -> Result<()> {
        if !obj.is_unshared() {
            return Ok(());
        }
        self.track(obj)?;
        let children = match obj {
            Object::List(list) => list.borrow().iter().filter(|item| item.is_unshared()).cloned().collect(),
            Object::Tuple(items) => items.iter().filter(|item| item.is_unshared()).cloned().collect(),
            Object::Dict(dict) => dict
                .borrow()
                .iter()
                .flat_map(|(k, v)| [k, v])
                .filter(|item| item.is_unshared())
                .cloned()
                .collect(),
            _ => Vec::new(),
        };
        children.iter().try_for_each(|child| self.track(child))
    }

    /// Charges `obj` unless it is tracked already.
    pub(super) fn track(&mut self, obj: &Object) -> Result<()> {
        match Tracked::of(obj) {
            Some((id, handle)) if !self.tracked.contains_key(&id) => {
                self.tracked.insert(id, handle);
                self.alloc(obj.own_size() + TRACKING)
            }
            _ => Ok(()),
        }
    }

    /// Drops the dead objects from the table and recounts the heap charge
    /// from the current sizes of the live ones.
    fn sweep(&mut self) -> Result<()> {
        let scanned = self.tracked.len();
        let mut heap = 0usize;
        self.tracked.retain(|_, handle| match handle.live_size() {
            Some(size) => {
                heap = heap.saturating_add(size + TRACKING);
                true
            }
            None => false,
        });
        self.heap = heap;
        self.sweep_at = heap + self.limits.max_memory.saturating_sub(heap) / 2;
        self.charge(scanned as u64 / 16)
    }

    pub(super) fn output_room(&self) -> usize {
        self.limits.max_output.saturating_sub(self.output.len())
    }

    pub(super) fn output_exceeded(&self) -> Fault {
        Fault::raise(
            "OutputLimitExceeded",
            format!("printed output exceeds {} bytes", self.limits.max_output),
        )
    }

    pub(super) fn write(&mut self, text: &str) -> Result<()> {
        if text.len() > self.output_room() {
            return Err(self.output_exceeded());
        }
        self.output.push_str(text);
        Ok(())
    }

    pub(super) fn read_line(&mut self) -> Option<&'i str> {
        self.stdin.next().map(|line| line.strip_suffix('\r').unwrap_or(line))
    }

    /// Materializes an iterable, charging one step per item.
    pub(super) fn collect(&mut self, iterable: &Object) -> Result<Vec<Object>> {
        let mut items = Vec::new();
        for item in ops::iterate(iterable)? {
            self.tick()?;
            items.push(item);
            self.check_len(items.len())?;
        }
        Ok(items)
    }

    pub(super) fn exec_block(&mut self, block: &[Stmt]) -> Result<Flow> {
        for stmt in block {
            match self.exec(stmt)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec(&mut self, stmt: &Stmt) -> Result<Flow> {
        self.tick()?;
        self.exec_kind(&stmt.kind).map_err(|fault| fault.at_line(stmt.line))
    }

    fn exec_kind(&mut self, kind: &StmtKind) -> Result<Flow> {
        match kind {
            StmtKind::Expr(expr) => {
                self.eval(expr)?;
            }
            StmtKind::Assign { targets, value } => {
                let value = self.eval(value)?;
                for target in targets {
                    self.assign(target, value.clone())?;
                }
            }
            StmtKind::AugAssign { target, op, value } => self.augmented(target, *op, value)?,
            StmtKind::If { branches, orelse } => {
                for (cond, body) in branches {
                    if self.eval(cond)?.truthy() {
                        return self.exec_block(body);
                    }
                }
                if let Some(orelse) = orelse {
                    return self.exec_block(orelse);
                }
            }
            StmtKind::While { cond, body, orelse } => {
                while self.eval(cond)?.truthy() {
                    match self.exec_block(body)? {
                        Flow::Break => return Ok(Flow::Normal),
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
                if let Some(orelse) = orelse {
                    return self.exec_block(orelse);
                }
            }
            StmtKind::For {
                target,
                iter,
                body,
                orelse,
            } => {
                let items = ops::iterate(&self.eval(iter)?)?;
                match self.exec_loop(target, body, items)? {
                    Flow::Normal => {}
                    Flow::Break => return Ok(Flow::Normal),
                    flow => return Ok(flow),
                }
                if let Some(orelse) = orelse {
                    return self.exec_block(orelse);
                }
            }
            StmtKind::Try {
                body,
                handlers,
                orelse,
                finalbody,
            } => return self.exec_try(body, handlers, orelse.as_deref(), finalbody.as_deref()),
            StmtKind::Def(def) => {
                let function = self.make_function(def)?;
                self.assign_name(&def.name, function);
            }
            StmtKind::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval(expr)?,
                    None => Object::None,
                };
                return Ok(Flow::Return(value));
            }
            StmtKind::Raise(exc) => return Err(self.raise(exc.as_ref())?),
            StmtKind::Assert { cond, msg } => {
                if !self.eval(cond)?.truthy() {
                    let message = match msg {
                        Some(msg) => to_str(&self.eval(msg)?)?,
                        None => String::new(),
                    };
                    return Err(Fault::raise("AssertionError", message));
                }
            }
            StmtKind::Global(names) => {
                if let Some(frame) = self.frames.last_mut().filter(|f| f.is_function()) {
                    frame.globals.extend(names.iter().cloned());
                }
            }
            StmtKind::Import { module, alias } => {
                let module = import(module)?;
                self.assign_name(alias.as_deref().unwrap_or(module), Object::Module(module));
            }
            StmtKind::ImportFrom { module, names } => {
                let module = import(module)?;
                for (name, alias) in names {
                    let value = builtins::module_attr(module, name).map_err(|_| {
                        Fault::raise(
                            "ImportError",
                            format!("cannot import name '{}' from '{}'", name, module),
                        )
                    })?;
                    self.assign_name(alias.as_ref().unwrap_or(name), value);
                }
            }
            StmtKind::Break => return Ok(Flow::Break),
            StmtKind::Continue => return Ok(Flow::Continue),
            StmtKind::Pass => {}
        }
        Ok(Flow::Normal)
    }

    /// `Normal` once the items run out, `Break` when the body broke out.
    fn exec_loop(&mut self, target: &Target, body: &[Stmt], items: ops::ObjIter) -> Result<Flow> {
        for item in items {
            self.tick()?;
            self.assign(target, item)?;
            match self.exec_block(body)? {
                Flow::Break => return Ok(Flow::Break),
                Flow::Return(value) => return Ok(Flow::Return(value)),
                Flow::Normal | Flow::Continue => {}
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_try(
        &mut self,
        body: &[Stmt],
        handlers: &[Handler],
        orelse: Option<&[Stmt]>,
        finalbody: Option<&[Stmt]>,
    ) -> Result<Flow> {
        let outcome = match self.exec_block(body) {
            Ok(Flow::Normal) => match orelse {
                Some(orelse) => self.exec_block(orelse),
                None => Ok(Flow::Normal),
            },
            Ok(flow) => Ok(flow),
            Err(fault) => match fault.catchable().cloned() {
                Some(exc) => self.handle(exc, fault, handlers),
                None => return Err(fault),
            },
        };
        if let Some(finalbody) = finalbody {
            match self.exec_block(finalbody)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        outcome
    }

    fn handle(&mut self, exc: Rc<Exception>, fault: Fault, handlers: &[Handler]) -> Result<Flow> {
        for handler in handlers {
            if let Some(kind) = &handler.kind {
                let kind = self.eval(kind)?;
                if !exception_matches(&exc, &kind)? {
                    continue;
                }
            }
            if let Some(name) = &handler.name {
                let bound = Object::Exception(exc.clone());
                self.track(&bound)?;
                self.assign_name(name, bound);
            }
            self.handling.push(exc);
            let result = self.exec_block(&handler.body);
            self.handling.pop();
            return result;
        }
        Err(fault)
    }

    fn raise(&mut self, exc: Option<&Expr>) -> Result<Fault> {
        let exc = match exc {
            None => match self.handling.last() {
                Some(exc) => exc.clone(),
                None => return Ok(Fault::raise("RuntimeError", "No active exception to reraise")),
            },
            Some(expr) => match self.eval(expr)? {
                Object::Exception(exc) => exc,
                Object::ExceptionType(kind) => Rc::new(Exception {
                    kind,
                    message: String::new(),
                }),
                _ => return Ok(Fault::type_error("exceptions must derive from BaseException")),
            },
        };
        Ok(Fault::Raised { exc, line: None })
    }

    fn augmented(&mut self, target: &Target, op: BinOp, value: &Expr) -> Result<()> {
        match target {
            Target::Name(name) => {
                let current = self.lookup(name)?;
                let rhs = self.eval(value)?;
                let result = self.combine(op, current, &rhs)?;
                self.assign_name(name, result);
                Ok(())
            }
            Target::Index { obj, index } => {
                let obj = self.eval(obj)?;
                let index = self.eval(index)?;
                let current = ops::getitem(&obj, &index)?;
                let rhs = self.eval(value)?;
                let result = self.combine(op, current, &rhs)?;
                self.store(&obj, &index, result)
            }
            Target::Unpack(_) => Err(Fault::raise(
                "SyntaxError",
                "illegal expression for augmented assignment",
            )),
        }
    }

    /// `list += iterable` extends in place; everything else rebinds.
    fn combine(&mut self, op: BinOp, current: Object, rhs: &Object) -> Result<Object> {
        if let (BinOp::Add, Object::List(list)) = (op, &current) {
            let extra = self.collect(rhs)?;
            self.check_len(list.borrow().len() + extra.len())?;
            self.alloc(extra.len() * SLOT)?;
            list.borrow_mut().extend(extra);
            return Ok(current);
        }
        self.binary(op, &current, rhs)
    }

    fn binary(&mut self, op: BinOp, left: &Object, right: &Object) -> Result<Object> {
        let result = ops::binary(op, left, right, self.limits.max_len)?;
        self.fresh(&result)?;
        Ok(result)
    }

    fn store(&mut self, obj: &Object, index: &Object, value: Object) -> Result<()> {
        if let Object::Dict(_) = obj {
            self.alloc(2 * SLOT)?;
        }
        ops::setitem(obj, index, value, self.limits.max_len)
    }

    fn lookup(&self, name: &str) -> Result<Object> {
        for frame in self.frames.iter().rev() {
            if let Some(value) = frame.locals.get(name) {
                return Ok(value.clone());
            }
            if let Scope::Function(function) = &frame.scope {
                if function.def.locals.contains(name) {
                    return Err(Fault::raise(
                        "UnboundLocalError",
                        format!("local variable '{}' referenced before assignment", name),
                    ));
                }
                if let Some(value) = function.captured.as_ref().and_then(|env| env.get(name)) {
                    return Ok(value.clone());
                }
                break;
            }
        }
        if let Some(value) = self.globals.get(name) {
            return Ok(value.clone());
        }
        if let Some(builtin) = Builtin::lookup(name) {
            return Ok(Object::Builtin(builtin));
        }
        if let Some(kind) = exception_type(name) {
            return Ok(Object::ExceptionType(kind));
        }
        Err(Fault::raise(
            "NameError",
            format!("name '{}' is not defined", name),
        ))
    }

    fn assign_name(&mut self, name: &str, value: Object) {
        if let Some(frame) = self.frames.last_mut() {
            if !(frame.is_function() && frame.globals.contains(name)) {
                frame.locals.insert(name.to_owned(), value);
                return;
            }
        }
        if !self.globals.contains_key(name) {
            self.order.push(name.to_owned());
        }
        self.globals.insert(name.to_owned(), value);
    }

    fn assign(&mut self, target: &Target, value: Object) -> Result<()> {
        match target {
            Target::Name(name) => {
                self.assign_name(name, value);
                Ok(())
            }
            Target::Index { obj, index } => {
                let obj = self.eval(obj)?;
                let index = self.eval(index)?;
                self.store(&obj, &index, value)
            }
            Target::Unpack(targets) => {
                let items = unpack(&value, targets.len())?;
                for (target, item) in targets.iter().zip(items) {
                    self.assign(target, item)?;
                }
                Ok(())
            }
        }
    }

    fn make_function(&mut self, def: &Rc<FuncDef>) -> Result<Object> {
        let mut defaults = Vec::with_capacity(def.params.len());
        for param in &def.params {
            defaults.push(match &param.default {
                Some(expr) => Some(self.eval(expr)?),
                None => None,
            });
        }
        let function = Object::Function(Rc::new(Function {
            def: def.clone(),
            defaults,
            captured: self.capture(),
        }));
        self.track(&function)?;
        Ok(function)
    }

    /// Snapshot of the enclosing non-global scopes, innermost binding wins.
    fn capture(&self) -> Option<Rc<HashMap<String, Object>>> {
        if self.frames.is_empty() {
            return None;
        }
        let start = self.frames.iter().rposition(Frame::is_function).unwrap_or(0);
        let mut env = HashMap::new();
        for frame in &self.frames[start..] {
            if let Scope::Function(function) = &frame.scope {
                if let Some(captured) = &function.captured {
                    env.extend(captured.iter().map(|(k, v)| (k.clone(), v.clone())));
                }
            }
            env.extend(frame.locals.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        Some(Rc::new(env))
    }

    pub(super) fn call(
        &mut self,
        callee: &Object,
        args: Vec<Object>,
        kwargs: Vec<(String, Object)>,
    ) -> Result<Object> {
        match callee {
            Object::Function(function) => self.call_function(function, args, kwargs),
            Object::Builtin(builtin) => {
                let result = self.call_builtin(*builtin, args, kwargs)?;
                self.fresh(&result)?;
                Ok(result)
            }
            Object::Method(receiver, name) => {
                let result = self.call_method(receiver, name, args, kwargs)?;
                self.fresh(&result)?;
                Ok(result)
            }
            Object::ExceptionType(kind) => {
                if let Some((key, _)) = kwargs.first() {
                    return Err(Fault::type_error(format!(
                        "{}() takes no keyword arguments, got '{}'",
                        kind, key
                    )));
                }
                let message = match args.len() {
                    0 => String::new(),
                    1 => to_str(&args[0])?,
                    _ => repr(&Object::tuple(args))?,
                };
                self.built(Object::Exception(Rc::new(Exception {
                    kind: *kind,
                    message,
                })))
            }
            other => Err(Fault::type_error(format!(
                "'{}' object is not callable",
                other.type_name()
            ))),
        }
    }

    fn call_function(
        &mut self,
        function: &Rc<Function>,
        args: Vec<Object>,
        kwargs: Vec<(String, Object)>,
    ) -> Result<Object> {
        let def = &function.def;
        let params = &def.params;
        if args.len() > params.len() {
            return Err(Fault::type_error(format!(
                "{}() takes {} positional argument{} but {} {} given",
                def.name,
                params.len(),
                plural(params.len()),
                args.len(),
                if args.len() == 1 { "was" } else { "were" }
            )));
        }

        let mut slots: Vec<Option<Object>> = args.into_iter().map(Some).collect();
        slots.resize(params.len(), None);
        for (key, value) in kwargs {
            match params.iter().position(|p| p.name == key) {
                None => {
                    return Err(Fault::type_error(format!(
                        "{}() got an unexpected keyword argument '{}'",
                        def.name, key
                    )))
                }
                Some(i) if slots[i].is_some() => {
                    return Err(Fault::type_error(format!(
                        "{}() got multiple values for argument '{}'",
                        def.name, key
                    )))
                }
                Some(i) => slots[i] = Some(value),
            }
        }

        let mut locals = HashMap::with_capacity(params.len());
        let mut missing = Vec::new();
        for ((param, slot), default) in params.iter().zip(slots).zip(&function.defaults) {
            match slot.or_else(|| default.clone()) {
                Some(value) => {
                    locals.insert(param.name.clone(), value);
                }
                None => missing.push(format!("'{}'", param.name)),
            }
        }
        if !missing.is_empty() {
            return Err(Fault::type_error(format!(
                "{}() missing {} required positional argument{}: {}",
                def.name,
                missing.len(),
                plural(missing.len()),
                missing.join(" and ")
            )));
        }

        if self.depth >= self.limits.max_depth {
            return Err(Fault::raise(
                "RecursionError",
                "maximum recursion depth exceeded",
            ));
        }
        self.depth += 1;
        self.frames.push(Frame {
            scope: Scope::Function(function.clone()),
            locals,
            globals: HashSet::new(),
        });
        let result = self.exec_block(&def.body);
        self.frames.pop();
        self.depth -= 1;

        match result? {
            Flow::Return(value) => Ok(value),
            _ => Ok(Object::None),
        }
    }

    pub(super) fn eval(&mut self, expr: &Expr) -> Result<Object> {
        self.tick()?;
        match expr {
            Expr::None => Ok(Object::None),
            Expr::Bool(b) => Ok(Object::Bool(*b)),
            Expr::Int(n) => Ok(Object::Int(*n)),
            Expr::Float(x) => Ok(Object::Float(*x)),
            Expr::Str(s) => Ok(Object::Str(s.clone())),
            Expr::FString(parts) => self.fstring(parts),
            Expr::Name(name) => self.lookup(name),
            Expr::List(items) => {
                let items = self.eval_all(items)?;
                self.check_len(items.len())?;
                self.built(Object::list(items))
            }
            Expr::Tuple(items) => {
                let items = self.eval_all(items)?;
                self.built(Object::tuple(items))
            }
            Expr::Dict(pairs) => {
                let mut entries = Vec::with_capacity(pairs.len());
                for (key, value) in pairs {
                    let key = self.eval(key)?;
                    ops::check_hashable(&key)?;
                    let value = self.eval(value)?;
                    ops::dict_insert(&mut entries, key, value);
                }
                self.built(Object::dict(entries))
            }
            Expr::ListComp { elt, generators } => {
                let max_len = self.limits.max_len;
                let mut items = Vec::new();
                self.comprehension(generators, &mut |this: &mut Self| {
                    items.push(this.eval(elt)?);
                    ops::check_len(items.len(), max_len)
                })?;
                self.built(Object::list(items))
            }
            Expr::DictComp {
                key,
                value,
                generators,
            } => {
                let max_len = self.limits.max_len;
                let mut entries = Vec::new();
                self.comprehension(generators, &mut |this: &mut Self| {
                    let key = this.eval(key)?;
                    ops::check_hashable(&key)?;
                    let value = this.eval(value)?;
                    ops::dict_insert(&mut entries, key, value);
                    ops::check_len(entries.len(), max_len)
                })?;
                self.built(Object::dict(entries))
            }
            Expr::Attr { obj, name } => {
                let obj = self.eval(obj)?;
                let attr = builtins::get_attr(&obj, name)?;
                self.built(attr)
            }
            Expr::Index { obj, index } => {
                let obj = self.eval(obj)?;
                let index = self.eval(index)?;
                ops::getitem(&obj, &index)
            }
            Expr::Slice {
                obj,
                lower,
                upper,
                step,
            } => {
                let obj = self.eval(obj)?;
                let lower = self.eval_opt(lower.as_deref())?;
                let upper = self.eval_opt(upper.as_deref())?;
                let step = self.eval_opt(step.as_deref())?;
                let slice = ops::getslice(&obj, lower.as_ref(), upper.as_ref(), step.as_ref())?;
                self.built(slice)
            }
            Expr::Call { func, args } => {
                let callee = self.eval(func)?;
                let (args, kwargs) = self.eval_args(args)?;
                self.call(&callee, args, kwargs)
            }
            Expr::Unary { op, operand } => {
                let operand = self.eval(operand)?;
                ops::unary(*op, &operand)
            }
            Expr::Binary { op, left, right } => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                self.binary(*op, &left, &right)
            }
            Expr::Compare { left, ops: chain } => {
                let mut lhs = self.eval(left)?;
                for (op, right) in chain {
                    let rhs = self.eval(right)?;
                    if !ops::compare(*op, &lhs, &rhs)? {
                        return Ok(Object::Bool(false));
                    }
                    lhs = rhs;
                }
                Ok(Object::Bool(true))
            }
            Expr::And(left, right) => {
                let left = self.eval(left)?;
                if left.truthy() {
                    self.eval(right)
                } else {
                    Ok(left)
                }
            }
            Expr::Or(left, right) => {
                let left = self.eval(left)?;
                if left.truthy() {
                    Ok(left)
                } else {
                    self.eval(right)
                }
            }
            Expr::IfElse { cond, then, orelse } => {
                if self.eval(cond)?.truthy() {
                    self.eval(then)
                } else {
                    self.eval(orelse)
                }
            }
            Expr::Lambda(def) => self.make_function(def),
        }
    }

    fn built(&mut self, obj: Object) -> Result<Object> {
        self.fresh(&obj)?;
        Ok(obj)
    }

    fn eval_all(&mut self, exprs: &[Expr]) -> Result<Vec<Object>> {
        exprs.iter().map(|expr| self.eval(expr)).collect()
    }

    fn eval_opt(&mut self, expr: Option<&Expr>) -> Result<Option<Object>> {
        expr.map(|expr| self.eval(expr)).transpose()
    }

    fn eval_args(&mut self, args: &[Arg]) -> Result<(Vec<Object>, Vec<(String, Object)>)> {
        let mut positional = Vec::with_capacity(args.len());
        let mut keywords = Vec::new();
        for arg in args {
            match arg {
                Arg::Pos(expr) => positional.push(self.eval(expr)?),
                Arg::Star(expr) => {
                    let iterable = self.eval(expr)?;
                    positional.extend(self.collect(&iterable)?);
                    self.check_len(positional.len())?;
                }
                Arg::Kw(name, expr) => {
                    let value = self.eval(expr)?;
                    if keywords.iter().any(|(k, _)| k == name) {
                        return Err(Fault::type_error(format!(
                            "keyword argument repeated: {}",
                            name
                        )));
                    }
                    keywords.push((name.clone(), value));
                }
            }
        }
        Ok((positional, keywords))
    }

    fn comprehension(&mut self, generators: &[Comprehension], emit: &mut Emit<'_, 'i>) -> Result<()> {
        self.frames.push(Frame {
            scope: Scope::Comprehension,
            locals: HashMap::new(),
            globals: HashSet::new(),
        });
        let result = self.generate(generators, emit);
        self.frames.pop();
        result
    }

    fn generate(&mut self, generators: &[Comprehension], emit: &mut Emit<'_, 'i>) -> Result<()> {
        let (first, rest) = match generators.split_first() {
            Some(split) => split,
            None => return emit(self),
        };
        let iterable = self.eval(&first.iter)?;
        'items: for item in ops::iterate(&iterable)? {
            self.tick()?;
            self.assign(&first.target, item)?;
            for cond in &first.conds {
                if !self.eval(cond)?.truthy() {
                    continue 'items;
                }
            }
            self.generate(rest, emit)?;
        }
        Ok(())
    }

    fn fstring(&mut self, parts: &[FPart]) -> Result<Object> {
        let mut out = String::new();
        for part in parts {
            match part {
                FPart::Lit(text) => out.push_str(text),
                FPart::Expr {
                    expr,
                    conversion,
                    spec,
                } => {
                    let value = self.eval(expr)?;
                    let value = match conversion {
                        Some('r') | Some('a') => Object::Str(repr(&value)?.into()),
                        Some(_) => Object::Str(to_str(&value)?.into()),
                        None => value,
                    };
                    out.push_str(&format_spec(&value, spec)?);
                }
            }
        }
        self.check_len(out.chars().count())?;
        self.built(Object::Str(out.into()))
    }
}

fn import(module: &str) -> Result<&'static str> {
    match module {
        "math" => Ok("math"),
        other => Err(Fault::raise(
            "ModuleNotFoundError",
            format!("No module named '{}'", other),
        )),
    }
}

fn exception_matches(exc: &Exception, kind: &Object) -> Result<bool> {
    match kind {
        Object::ExceptionType(base) => Ok(is_subclass(exc.kind, base)),
        Object::Tuple(kinds) => {
            for kind in kinds.iter() {
                if exception_matches(exc, kind)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        _ => Err(Fault::type_error(
            "catching classes that do not inherit from BaseException is not allowed",
        )),
    }
}

fn unpack(value: &Object, expected: usize) -> Result<Vec<Object>> {
    let items: Vec<Object> = ops::iterate(value)
        .map_err(|_| {
            Fault::type_error(format!(
                "cannot unpack non-iterable {} object",
                value.type_name()
            ))
        })?
        .take(expected + 1)
        .collect();
    if items.len() > expected {
        return Err(Fault::value_error(format!(
            "too many values to unpack (expected {})",
            expected
        )));
    }
    if items.len() < expected {
        return Err(Fault::value_error(format!(
            "not enough values to unpack (expected {}, got {})",
            expected,
            items.len()
        )));
    }
    Ok(items)
}

pub(super) fn plural(n: usize) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}
