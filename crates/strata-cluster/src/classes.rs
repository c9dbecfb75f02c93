//! Object class methods callable through the exec sub-operation.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use strata_store::ObjectState;
use strata_types::ErrorKind;
use tracing::debug;

/// Whether a method may change the object.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MethodKind {
    Read,
    Write,
}

/// Signature of a class method: the object it runs against and its input.
pub type MethodFn =
    dyn Fn(&mut MethodContext<'_>, &[u8]) -> Result<Vec<u8>, ErrorKind> + Send + Sync;

struct ClassMethod {
    kind: MethodKind,
    func: Box<MethodFn>,
}

/// The object a method runs against.
///
/// Mutators fail with `PermissionDenied` unless the method was registered
/// as [`MethodKind::Write`].
pub struct MethodContext<'a> {
    object: &'a mut Option<ObjectState>,
    kind: MethodKind,
    mtime: DateTime<Utc>,
    dirty: bool,
}

impl<'a> MethodContext<'a> {
    pub(crate) fn new(
        object: &'a mut Option<ObjectState>,
        kind: MethodKind,
        mtime: DateTime<Utc>,
    ) -> Self {
        Self {
            object,
            kind,
            mtime,
            dirty: false,
        }
    }

    pub fn exists(&self) -> bool {
        self.object.is_some()
    }

    pub fn data(&self) -> Result<&[u8], ErrorKind> {
        self.state().map(|s| s.data.as_slice())
    }

    pub fn xattr(&self, name: &str) -> Result<Option<&[u8]>, ErrorKind> {
        Ok(self.state()?.xattrs.get(name).map(Vec::as_slice))
    }

    pub fn omap_get(&self, key: &str) -> Result<Option<&[u8]>, ErrorKind> {
        Ok(self.state()?.omap.get(key).map(Vec::as_slice))
    }

    /// Create the object if it does not exist.
    pub fn create(&mut self, exclusive: bool) -> Result<(), ErrorKind> {
        self.check_writable()?;
        if self.object.is_some() {
            return if exclusive { Err(ErrorKind::Exists) } else { Ok(()) };
        }
        *self.object = Some(ObjectState::new(self.mtime));
        self.dirty = true;
        Ok(())
    }

    pub fn write_full(&mut self, data: &[u8]) -> Result<(), ErrorKind> {
        self.state_mut()?.write_full(data);
        Ok(())
    }

    pub fn set_xattr(&mut self, name: &str, value: &[u8]) -> Result<(), ErrorKind> {
        self.state_mut()?
            .xattrs
            .insert(name.to_string(), value.to_vec());
        Ok(())
    }

    pub fn omap_set(&mut self, key: &str, value: &[u8]) -> Result<(), ErrorKind> {
        self.state_mut()?.omap.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    pub(crate) fn is_dirty(&self) -> bool {
        self.dirty
    }

    fn state(&self) -> Result<&ObjectState, ErrorKind> {
        self.object.as_ref().ok_or(ErrorKind::NotFound)
    }

    fn check_writable(&self) -> Result<(), ErrorKind> {
        match self.kind {
            MethodKind::Write => Ok(()),
            MethodKind::Read => Err(ErrorKind::PermissionDenied),
        }
    }

    fn state_mut(&mut self) -> Result<&mut ObjectState, ErrorKind> {
        self.check_writable()?;
        self.dirty = true;
        let mtime = self.mtime;
        Ok(self.object.get_or_insert_with(|| ObjectState::new(mtime)))
    }
}

/// Registered classes and their methods.
#[derive(Default)]
pub struct ClassRegistry {
    classes: HashMap<String, HashMap<String, ClassMethod>>,
}

impl ClassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the `hello` and `counter` classes.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("hello", "say_hello", MethodKind::Read, say_hello);
        registry.register("hello", "record_hello", MethodKind::Write, record_hello);
        registry.register("counter", "get", MethodKind::Read, counter_get);
        registry.register("counter", "inc", MethodKind::Write, counter_inc);
        registry
    }

    /// Register `class.method`, replacing an earlier registration.
    pub fn register<F>(&mut self, class: &str, method: &str, kind: MethodKind, func: F)
    where
        F: Fn(&mut MethodContext<'_>, &[u8]) -> Result<Vec<u8>, ErrorKind> + Send + Sync + 'static,
    {
        debug!(class, method, ?kind, "class method registered");
        self.classes.entry(class.to_string()).or_default().insert(
            method.to_string(),
            ClassMethod {
                kind,
                func: Box::new(func),
            },
        );
    }

    /// Kind of `class.method`, `NotFound` when unregistered.
    pub fn kind(&self, class: &str, method: &str) -> Result<MethodKind, ErrorKind> {
        self.lookup(class, method).map(|m| m.kind)
    }

    /// Run `class.method` against `object`. Returns the method output and
    /// whether the object changed.
    pub(crate) fn call(
        &self,
        class: &str,
        method: &str,
        object: &mut Option<ObjectState>,
        mtime: DateTime<Utc>,
        input: &[u8],
    ) -> Result<(Vec<u8>, bool), ErrorKind> {
        let entry = self.lookup(class, method)?;
        let mut ctx = MethodContext::new(object, entry.kind, mtime);
        let output = (entry.func)(&mut ctx, input)?;
        Ok((output, ctx.is_dirty()))
    }

    fn lookup(&self, class: &str, method: &str) -> Result<&ClassMethod, ErrorKind> {
        self.classes
            .get(class)
            .and_then(|methods| methods.get(method))
            .ok_or(ErrorKind::NotFound)
    }
}

impl fmt::Debug for ClassRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<String> = self
            .classes
            .iter()
            .flat_map(|(class, methods)| methods.keys().map(move |m| format!("{class}.{m}")))
            .collect();
        names.sort();
        f.debug_struct("ClassRegistry").field("methods", &names).finish()
    }
}

fn greeting(input: &[u8]) -> Vec<u8> {
    let name = if input.is_empty() {
        "world".into()
    } else {
        String::from_utf8_lossy(input)
    };
    format!("Hello, {name}!").into_bytes()
}

fn say_hello(_ctx: &mut MethodContext<'_>, input: &[u8]) -> Result<Vec<u8>, ErrorKind> {
    Ok(greeting(input))
}

fn record_hello(ctx: &mut MethodContext<'_>, input: &[u8]) -> Result<Vec<u8>, ErrorKind> {
    ctx.create(true)?;
    ctx.write_full(&greeting(input))?;
    Ok(Vec::new())
}

const COUNTER_XATTR: &str = "counter";

fn parse_counter(bytes: &[u8]) -> Result<i64, ErrorKind> {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .ok_or(ErrorKind::InvalidOperation)
}

fn counter_get(ctx: &mut MethodContext<'_>, _input: &[u8]) -> Result<Vec<u8>, ErrorKind> {
    let value = match ctx.xattr(COUNTER_XATTR)? {
        Some(bytes) => parse_counter(bytes)?,
        None => 0,
    };
    Ok(value.to_string().into_bytes())
}

/// Add the decimal delta in `input` (1 when empty) and return the new value.
fn counter_inc(ctx: &mut MethodContext<'_>, input: &[u8]) -> Result<Vec<u8>, ErrorKind> {
    let delta = if input.is_empty() { 1 } else { parse_counter(input)? };
    let current = match ctx.xattr(COUNTER_XATTR) {
        Ok(Some(bytes)) => parse_counter(bytes)?,
        Ok(None) | Err(ErrorKind::NotFound) => 0,
        Err(kind) => return Err(kind),
    };
    let next = current.checked_add(delta).ok_or(ErrorKind::InvalidOperation)?;
    let text = next.to_string();
    ctx.set_xattr(COUNTER_XATTR, text.as_bytes())?;
    Ok(text.into_bytes())
}
