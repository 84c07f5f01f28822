//! Tree-walking interpreter with capability-checked dispatch.
//!
//! Every call site goes through [`Interpreter::dispatch`] or
//! [`Interpreter::call_implicit`], which consult the sandbox before reaching
//! a builtin or a native host method. Interpreted host methods are validated
//! in relaxed mode on first use within an evaluation. The cancellation token
//! is polled at every node and loop iteration.

use std::collections::HashMap;
use std::sync::Arc;

use peek_runtime::{
    ClassRegistry, Frame, IntRange, MethodDef, MethodLookup, Value, MAX_VALUE_DEPTH,
};
use peek_scheduler::CancellationToken;

use crate::ast::{Block, Call, Expr, StrPart, Target};
use crate::builtins;
use crate::compiler::{self, ValidationMode};
use crate::error::{EvaluationError, MutationCause};
use crate::sandbox::{self, ReceiverKind};

/// Non-local control flow. Only `Error` escapes an evaluation.
#[derive(Debug)]
pub(crate) enum Interrupt {
    Error(EvaluationError),
    Break(Value),
    Next(Value),
    Return(Value),
}

impl From<EvaluationError> for Interrupt {
    fn from(err: EvaluationError) -> Self {
        Interrupt::Error(err)
    }
}

pub(crate) type Flow<T> = Result<T, Interrupt>;

/// Shorthand for a Ruby exception raised by the expression.
pub(crate) fn raise(class: &str, message: impl std::fmt::Display) -> Interrupt {
    Interrupt::Error(EvaluationError::raise(class, message))
}

struct Scope {
    /// Later entries shadow earlier ones; block parameters are pushed and
    /// truncated away when the block returns.
    vars: Vec<(String, Value)>,
    receiver: Value,
    /// Class whose constants and class variables are lexically visible.
    class: Option<Arc<str>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct MethodKey {
    owner: String,
    name: String,
    singleton: bool,
}

pub(crate) struct Interpreter<'r> {
    registry: &'r ClassRegistry,
    cancel: &'r CancellationToken,
    max_call_depth: usize,
    call_depth: usize,
    scopes: Vec<Scope>,
    method_bodies: HashMap<MethodKey, Arc<Vec<Expr>>>,
}

impl<'r> Interpreter<'r> {
    pub(crate) fn new(
        registry: &'r ClassRegistry,
        cancel: &'r CancellationToken,
        max_call_depth: usize,
        frame: &Frame,
    ) -> Self {
        let class = match &frame.receiver {
            Value::Object(heap) => Some(heap.read().class.clone()),
            Value::Class(name) => Some(name.clone()),
            _ => None,
        };
        let top = Scope {
            vars: frame.bindings().cloned().collect(),
            receiver: frame.receiver.clone(),
            class,
        };
        Self {
            registry,
            cancel,
            max_call_depth,
            call_depth: 0,
            scopes: vec![top],
            method_bodies: HashMap::new(),
        }
    }

    pub(crate) fn run(&mut self, body: &[Expr]) -> Result<Value, EvaluationError> {
        let value = match self.eval_body(body) {
            Ok(value) | Err(Interrupt::Return(value)) | Err(Interrupt::Next(value)) => value,
            Err(Interrupt::Error(err)) => return Err(err),
            Err(Interrupt::Break(_)) => {
                return Err(EvaluationError::raise(
                    "LocalJumpError",
                    "break from proc-closure",
                ))
            }
        };
        // Callers render and capture the result recursively.
        if value.nests_deeper_than(MAX_VALUE_DEPTH) {
            return Err(EvaluationError::raise(
                "SystemStackError",
                format!("result is nested more than {MAX_VALUE_DEPTH} levels deep"),
            ));
        }
        Ok(value)
    }

    pub(crate) fn registry(&self) -> &'r ClassRegistry {
        self.registry
    }

    pub(crate) fn check(&self) -> Flow<()> {
        if self.cancel.is_cancelled() {
            return Err(EvaluationError::Cancelled.into());
        }
        Ok(())
    }

    fn scope(&self) -> &Scope {
        // The top-level scope is pushed in `new` and never popped.
        &self.scopes[self.scopes.len() - 1]
    }

    fn scope_mut(&mut self) -> &mut Scope {
        let last = self.scopes.len() - 1;
        &mut self.scopes[last]
    }

    fn lookup_local(&self, name: &str) -> Option<Value> {
        self.scope()
            .vars
            .iter()
            .rev()
            .find(|(candidate, _)| candidate == name)
            .map(|(_, value)| value.clone())
    }

    fn assign_local(&mut self, name: &str, value: Value) {
        let vars = &mut self.scope_mut().vars;
        match vars.iter().rposition(|(candidate, _)| candidate == name) {
            Some(idx) => vars[idx].1 = value,
            None => vars.push((name.to_owned(), value)),
        }
    }

    pub(crate) fn eval_body(&mut self, body: &[Expr]) -> Flow<Value> {
        let mut last = Value::Nil;
        for expr in body {
            last = self.eval(expr)?;
        }
        Ok(last)
    }

    fn eval_opt(&mut self, expr: &Option<Box<Expr>>) -> Flow<Value> {
        match expr {
            Some(expr) => self.eval(expr),
            None => Ok(Value::Nil),
        }
    }

    fn eval(&mut self, expr: &Expr) -> Flow<Value> {
        self.check()?;
        match expr {
            Expr::Nil => Ok(Value::Nil),
            Expr::True => Ok(Value::Bool(true)),
            Expr::False => Ok(Value::Bool(false)),
            Expr::SelfRef => Ok(self.scope().receiver.clone()),
            Expr::Int(value) => Ok(Value::Int(*value)),
            Expr::Float(value) => Ok(Value::Float(*value)),
            Expr::Str(text) => Ok(Value::str(text.as_str())),
            Expr::Interp(parts) => self.eval_interp(parts),
            Expr::Symbol(name) => Ok(Value::symbol(name.as_str())),
            Expr::Regexp(pattern) => Ok(Value::Regexp(Arc::clone(pattern))),
            Expr::Array(items) => {
                let items = items
                    .iter()
                    .map(|item| self.eval(item))
                    .collect::<Flow<Vec<_>>>()?;
                Ok(Value::array(items))
            }
            Expr::Hash(entries) => {
                let mut out: Vec<(Value, Value)> = Vec::with_capacity(entries.len());
                for (key, value) in entries {
                    let key = self.eval(key)?;
                    let value = self.eval(value)?;
                    builtins::hash_insert(&mut out, key, value);
                }
                Ok(Value::hash(out))
            }
            Expr::Range {
                start,
                end,
                exclusive,
            } => {
                let start = self.eval(start)?;
                let end = self.eval(end)?;
                match (start, end) {
                    (Value::Int(start), Value::Int(end)) => {
                        Ok(Value::Range(IntRange::new(start, end, *exclusive)))
                    }
                    _ => Err(raise("ArgumentError", "bad value for range")),
                }
            }
            Expr::Ident(name) => match self.lookup_local(name) {
                Some(value) => Ok(value),
                None => self.call_implicit(name, &[], None),
            },
            Expr::Const(name) => self.constant(name),
            Expr::ScopedConst { scope, name } => {
                let scope = self.eval(scope)?;
                self.scoped_constant(&scope, name)
            }
            Expr::IVar(name) => Ok(match &self.scope().receiver {
                Value::Object(heap) => heap.read().field(name).cloned().unwrap_or(Value::Nil),
                _ => Value::Nil,
            }),
            Expr::CVar(name) => {
                let class = self.scope().class.clone();
                class
                    .as_deref()
                    .and_then(|class| self.registry.class_variable(class, name))
                    .ok_or_else(|| {
                        raise(
                            "NameError",
                            format!(
                                "uninitialized class variable @@{name} in {}",
                                class.as_deref().unwrap_or("Object")
                            ),
                        )
                    })
            }
            Expr::GVar(name) => Ok(self.registry.global(name).unwrap_or(Value::Nil)),
            Expr::Call(call) => self.eval_call(call),
            Expr::Not(inner) => Ok(Value::Bool(!self.eval(inner)?.truthy())),
            Expr::And(lhs, rhs) => {
                let lhs = self.eval(lhs)?;
                if lhs.truthy() {
                    self.eval(rhs)
                } else {
                    Ok(lhs)
                }
            }
            Expr::Or(lhs, rhs) => {
                let lhs = self.eval(lhs)?;
                if lhs.truthy() {
                    Ok(lhs)
                } else {
                    self.eval(rhs)
                }
            }
            Expr::If {
                cond,
                then_body,
                else_body,
            } => {
                if self.eval(cond)?.truthy() {
                    self.eval_body(then_body)
                } else {
                    self.eval_body(else_body)
                }
            }
            Expr::While {
                cond,
                body,
                negated,
            } => {
                loop {
                    self.check()?;
                    if self.eval(cond)?.truthy() == *negated {
                        break;
                    }
                    match self.eval_body(body) {
                        Ok(_) | Err(Interrupt::Next(_)) => {}
                        Err(Interrupt::Break(value)) => return Ok(value),
                        Err(other) => return Err(other),
                    }
                }
                Ok(Value::Nil)
            }
            Expr::Begin(body) => self.eval_body(body),
            Expr::Break(value) => Err(Interrupt::Break(self.eval_opt(value)?)),
            Expr::Next(value) => Err(Interrupt::Next(self.eval_opt(value)?)),
            Expr::Return(value) => Err(Interrupt::Return(self.eval_opt(value)?)),
            Expr::Assign { target, value } => {
                let name = self.writable_local(target)?;
                let value = self.eval(value)?;
                self.assign_local(name, value.clone());
                Ok(value)
            }
            Expr::OpAssign { target, op, value } => {
                let name = self.writable_local(target)?;
                let current = self.lookup_local(name).unwrap_or(Value::Nil);
                let updated = match op.as_str() {
                    "||" if current.truthy() => return Ok(current),
                    "&&" if !current.truthy() => return Ok(current),
                    "||" | "&&" => self.eval(value)?,
                    op => {
                        let rhs = self.eval(value)?;
                        self.dispatch(&current, op, &[rhs], None)?
                    }
                };
                self.assign_local(name, updated.clone());
                Ok(updated)
            }
            Expr::ClassDef { .. } => Err(prohibited("class definition")),
            Expr::ModuleDef { .. } => Err(prohibited("module definition")),
            Expr::MethodDef { .. } => Err(prohibited("method definition")),
            Expr::Rescue { .. } => Err(prohibited("exception handler")),
        }
    }

    /// Validation already rejected every non-local write; refuse them again
    /// in case an unvalidated tree reaches the interpreter.
    fn writable_local<'t>(&self, target: &'t Target) -> Flow<&'t str> {
        match target {
            Target::Local(name) => Ok(name.as_str()),
            other => Err(prohibited(other.describe())),
        }
    }

    fn eval_interp(&mut self, parts: &[StrPart]) -> Flow<Value> {
        let mut out = String::new();
        for part in parts {
            match part {
                StrPart::Lit(text) => out.push_str(text),
                StrPart::Code(code) => {
                    let value = self.eval_body(code)?;
                    out.push_str(&self.to_s(&value)?);
                }
            }
        }
        Ok(Value::str(out))
    }

    /// `to_s` as used by interpolation: host objects dispatch, builtins
    /// render directly.
    pub(crate) fn to_s(&mut self, value: &Value) -> Flow<String> {
        if let Value::Object(heap) = value {
            let class = heap.read().class.clone();
            if self.registry.find_method(&class, "to_s").is_some() {
                let rendered = self.dispatch(value, "to_s", &[], None)?;
                return builtins::display(&rendered);
            }
        }
        builtins::display(value)
    }

    fn constant(&self, name: &str) -> Flow<Value> {
        let class = self.scope().class.clone();
        if let Some(value) = self.registry.constant(class.as_deref(), name) {
            return Ok(value);
        }
        if builtins::is_builtin_class(name) {
            return Ok(Value::class(name));
        }
        Err(raise("NameError", format!("uninitialized constant {name}")))
    }

    fn scoped_constant(&self, scope: &Value, name: &str) -> Flow<Value> {
        let Value::Class(scope) = scope else {
            let rendered = scope.inspect().unwrap_or_else(|_| scope.type_name());
            return Err(raise("TypeError", format!("{rendered} is not a class/module")));
        };
        if let Some(value) = builtins::class_constant(scope, name) {
            return Ok(value);
        }
        if let Some(value) = self
            .registry
            .ancestors(scope)
            .find_map(|def| def.constants.get(name))
        {
            return Ok(value.clone());
        }
        let nested = format!("{scope}::{name}");
        if self.registry.is_class(&nested) {
            return Ok(Value::class(nested));
        }
        Err(raise("NameError", format!("uninitialized constant {nested}")))
    }

    fn eval_call(&mut self, call: &Call) -> Flow<Value> {
        let receiver = match &call.receiver {
            Some(expr) => Some(self.eval(expr)?),
            None => None,
        };
        if call.safe_nav && receiver.as_ref().is_some_and(Value::is_nil) {
            return Ok(Value::Nil);
        }
        let args = call
            .args
            .iter()
            .map(|arg| self.eval(arg))
            .collect::<Flow<Vec<_>>>()?;
        let block = call.block.as_ref();
        let result = match &receiver {
            Some(receiver) => self.dispatch(receiver, &call.name, &args, block),
            None => self.call_implicit(&call.name, &args, block),
        };
        match result {
            // `break` inside a block ends the call that received the block.
            Err(Interrupt::Break(value)) if block.is_some() => Ok(value),
            other => other,
        }
    }

    /// Call `name` on an explicit receiver.
    pub(crate) fn dispatch(
        &mut self,
        receiver: &Value,
        name: &str,
        args: &[Value],
        block: Option<&Block>,
    ) -> Flow<Value> {
        self.check()?;
        if sandbox::is_meta_programming(name) {
            return Err(meta_programming(name));
        }
        match receiver {
            Value::Object(heap) => {
                let class = heap.read().class.clone();
                let registry = self.registry;
                if let Some(lookup) = registry.find_method(&class, name) {
                    return self.invoke(lookup, receiver, name, args, ReceiverKind::Instance);
                }
                if args.is_empty() && block.is_none() {
                    if let Some(value) = heap.read().field(name).cloned() {
                        return Ok(value);
                    }
                }
                if sandbox::is_call_allowed("Object", name, ReceiverKind::Instance) {
                    return builtins::call_object(self, receiver, name, args, block);
                }
                Err(no_method(receiver, name))
            }
            Value::Class(class) => {
                let registry = self.registry;
                if let Some(lookup) = registry.find_singleton_method(class, name) {
                    return self.invoke(lookup, receiver, name, args, ReceiverKind::Type);
                }
                if sandbox::is_call_allowed(class, name, ReceiverKind::Type) {
                    return builtins::call_class_method(self, class, name, args);
                }
                if sandbox::is_call_allowed("Class", name, ReceiverKind::Instance) {
                    return builtins::call_on_class(self, class, name, args);
                }
                Err(prohibited_native(&format!("{class}.{name}")))
            }
            Value::Foreign(foreign) => {
                if sandbox::is_call_allowed("Object", name, ReceiverKind::Instance) {
                    return builtins::call_object(self, receiver, name, args, block);
                }
                Err(prohibited_native(&format!("{}#{name}", foreign.type_name())))
            }
            _ => {
                let type_name = receiver.type_name();
                if !sandbox::is_call_allowed(&type_name, name, ReceiverKind::Instance) {
                    return Err(prohibited_native(&format!("{type_name}#{name}")));
                }
                builtins::call(self, receiver, name, args, block)
            }
        }
    }

    /// Call `name` on the implicit `self`.
    pub(crate) fn call_implicit(
        &mut self,
        name: &str,
        args: &[Value],
        block: Option<&Block>,
    ) -> Flow<Value> {
        if sandbox::is_meta_programming(name) {
            return Err(meta_programming(name));
        }
        let receiver = self.scope().receiver.clone();
        let registry = self.registry;
        let lookup = match &receiver {
            Value::Object(heap) => {
                let class = heap.read().class.clone();
                registry
                    .find_method(&class, name)
                    .map(|lookup| (lookup, ReceiverKind::Instance))
            }
            Value::Class(class) => registry
                .find_singleton_method(class, name)
                .map(|lookup| (lookup, ReceiverKind::Type)),
            _ => None,
        };
        if let Some((lookup, kind)) = lookup {
            return self.invoke(lookup, &receiver, name, args, kind);
        }
        if builtins::is_kernel_function(name) {
            if !sandbox::is_call_allowed("Kernel", name, ReceiverKind::Instance) {
                return Err(prohibited_native(&format!("Kernel#{name}")));
            }
            return builtins::call_kernel(self, name, args, block);
        }
        if sandbox::is_call_allowed("Object", name, ReceiverKind::Instance) {
            return builtins::call_object(self, &receiver, name, args, block);
        }
        if args.is_empty() && block.is_none() {
            return Err(raise(
                "NameError",
                format!(
                    "undefined local variable or method `{name}' for {}",
                    describe_receiver(&receiver)
                ),
            ));
        }
        Err(no_method(&receiver, name))
    }

    fn invoke(
        &mut self,
        lookup: MethodLookup<'r>,
        receiver: &Value,
        name: &str,
        args: &[Value],
        kind: ReceiverKind,
    ) -> Flow<Value> {
        match lookup {
            MethodLookup::Interpreted { owner, def } => {
                self.invoke_interpreted(owner, name, def, receiver, args, kind)
            }
            MethodLookup::Native { owner, func } => {
                if !sandbox::is_call_allowed(owner, name, kind) {
                    let separator = if kind == ReceiverKind::Type { "." } else { "#" };
                    return Err(prohibited_native(&format!("{owner}{separator}{name}")));
                }
                func(receiver, args).map_err(|message| raise("RuntimeError", message))
            }
        }
    }

    fn invoke_interpreted(
        &mut self,
        owner: &str,
        name: &str,
        def: &MethodDef,
        receiver: &Value,
        args: &[Value],
        kind: ReceiverKind,
    ) -> Flow<Value> {
        let body = self.method_body(owner, name, def, kind == ReceiverKind::Type)?;
        if def.params.len() != args.len() {
            return Err(raise(
                "ArgumentError",
                format!(
                    "wrong number of arguments (given {}, expected {})",
                    args.len(),
                    def.params.len()
                ),
            ));
        }
        if self.call_depth >= self.max_call_depth {
            return Err(raise("SystemStackError", "stack level too deep"));
        }
        let vars = def.params.iter().cloned().zip(args.iter().cloned()).collect();
        self.scopes.push(Scope {
            vars,
            receiver: receiver.clone(),
            class: Some(Arc::from(owner)),
        });
        self.call_depth += 1;
        let result = self.eval_body(&body);
        self.call_depth -= 1;
        self.scopes.pop();
        match result {
            Ok(value) | Err(Interrupt::Return(value)) | Err(Interrupt::Next(value)) => Ok(value),
            Err(Interrupt::Break(_)) => Err(raise("LocalJumpError", "break from proc-closure")),
            Err(err) => Err(err),
        }
    }

    /// Parse and validate a host method body once per evaluation.
    fn method_body(
        &mut self,
        owner: &str,
        name: &str,
        def: &MethodDef,
        singleton: bool,
    ) -> Flow<Arc<Vec<Expr>>> {
        let key = MethodKey {
            owner: owner.to_owned(),
            name: name.to_owned(),
            singleton,
        };
        if let Some(body) = self.method_bodies.get(&key) {
            return Ok(Arc::clone(body));
        }
        let compiled = compiler::compile_with_mode(&def.body, ValidationMode::Relaxed).map_err(
            |err| {
                tracing::warn!(
                    target: "peek.sandbox",
                    owner,
                    method = name,
                    error = %err,
                    "host method body rejected"
                );
                EvaluationError::mutation(
                    MutationCause::ProhibitedMethodBody,
                    format!("method {owner}#{name} may mutate program state: {err}"),
                )
            },
        )?;
        let body = Arc::clone(compiled.body());
        self.method_bodies.insert(key, Arc::clone(&body));
        Ok(body)
    }

    /// Run a block with `args`. `next` returns from the block; `break`
    /// propagates to the call that received it.
    pub(crate) fn yield_block(&mut self, block: &Block, args: &[Value]) -> Flow<Value> {
        self.check()?;
        match block {
            Block::Symbol(name) => {
                let Some((receiver, rest)) = args.split_first() else {
                    return Err(raise("ArgumentError", "no receiver given"));
                };
                self.dispatch(receiver, name, rest, None)
            }
            Block::Literal { params, body } => {
                let values = match args {
                    [Value::Array(heap)] if params.len() > 1 => heap.snapshot(),
                    _ => args.to_vec(),
                };
                let mark = self.scope().vars.len();
                for (idx, param) in params.iter().enumerate() {
                    let value = values.get(idx).cloned().unwrap_or(Value::Nil);
                    self.scope_mut().vars.push((param.clone(), value));
                }
                let result = self.eval_body(body);
                self.scope_mut().vars.truncate(mark);
                match result {
                    Err(Interrupt::Next(value)) => Ok(value),
                    other => other,
                }
            }
        }
    }
}

fn prohibited(construct: &str) -> Interrupt {
    EvaluationError::mutation(
        MutationCause::ProhibitedConstruct,
        format!("{construct} is not allowed in a diagnostic expression"),
    )
    .into()
}

fn prohibited_native(target: &str) -> Interrupt {
    tracing::warn!(target: "peek.sandbox", call = target, "native call rejected");
    EvaluationError::mutation(
        MutationCause::ProhibitedNativeCall,
        format!("call to {target} may mutate program state"),
    )
    .into()
}

fn meta_programming(name: &str) -> Interrupt {
    tracing::warn!(target: "peek.sandbox", method = name, "meta-programming call rejected");
    EvaluationError::mutation(
        MutationCause::MetaProgramming,
        format!("meta-programming method `{name}` is not allowed"),
    )
    .into()
}

pub(crate) fn describe_receiver(value: &Value) -> String {
    match value {
        Value::Nil => "nil".to_owned(),
        Value::Bool(true) => "true".to_owned(),
        Value::Bool(false) => "false".to_owned(),
        Value::Class(name) => format!("class {name}"),
        other => format!("an instance of {}", other.type_name()),
    }
}

pub(crate) fn no_method(receiver: &Value, name: &str) -> Interrupt {
    raise(
        "NoMethodError",
        format!("undefined method `{name}' for {}", describe_receiver(receiver)),
    )
}
