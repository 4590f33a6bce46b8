//! Dynamic message dispatch.
//!
//! A send resolves the selector, finds the receiver's method to learn the
//! call shape (falling back to an all-object signature when there is none),
//! asks the runtime for the IMP, and calls it through a cached frame keyed
//! by the method's type string. Errors raised by host method bodies during
//! the call and exceptions thrown by the runtime surface as `Err`.

use super::api::ObjcSuper;
use super::call::CallFrame;
use super::class::Class;
use super::context::RuntimeContext;
use super::encoding::Signature;
use super::method::Method;
use super::object::Id;
use super::selector::Sel;
use super::value::Value;
use crate::config::FallbackPolicy;
use crate::error::{Error, Result};
use oxbridge_log::{debug, error, trace, warn};
use std::rc::Rc;

/// A selector plus its arguments.
///
/// ```
/// use oxbridge::{Message, Value};
///
/// let plain = Message::new("description");
/// assert_eq!(plain.selector(), "description");
///
/// let keywords = Message::keywords([("initWithX", Value::Int(1)), ("y", Value::Int(2))]);
/// assert_eq!(keywords.selector(), "initWithX:y:");
/// assert_eq!(keywords.args(), &[Value::Int(1), Value::Int(2)]);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    selector: String,
    args: Vec<Value>,
}

impl Message {
    /// A message with no arguments.
    pub fn new(selector: impl Into<String>) -> Self {
        Message {
            selector: selector.into(),
            args: Vec::new(),
        }
    }

    /// Joins keyword parts into a selector, in order, one `:` per part.
    pub fn keywords<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: AsRef<str>,
        V: Into<Value>,
    {
        let mut selector = String::new();
        let mut args = Vec::new();
        for (keyword, value) in pairs {
            selector.push_str(keyword.as_ref().trim_end_matches(':'));
            selector.push(':');
            args.push(value.into());
        }
        Message { selector, args }
    }

    /// A full selector with positional arguments.
    pub fn with_args(selector: impl Into<String>, args: Vec<Value>) -> Self {
        Message {
            selector: selector.into(),
            args,
        }
    }

    /// Appends a positional argument.
    #[must_use]
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }

    /// The selector name.
    pub fn selector(&self) -> &str {
        &self.selector
    }

    /// The positional arguments.
    pub fn args(&self) -> &[Value] {
        &self.args
    }
}

impl From<&str> for Message {
    fn from(selector: &str) -> Self {
        Message::new(selector)
    }
}

impl From<String> for Message {
    fn from(selector: String) -> Self {
        Message::new(selector)
    }
}

impl<V: Into<Value>> From<Vec<(&str, V)>> for Message {
    fn from(pairs: Vec<(&str, V)>) -> Self {
        Message::keywords(pairs)
    }
}

impl<V: Into<Value>, const N: usize> From<[(&str, V); N]> for Message {
    fn from(pairs: [(&str, V); N]) -> Self {
        Message::keywords(pairs)
    }
}

/// Where the method lookup starts.
enum Target {
    Receiver,
    Super(ObjcSuper),
}

impl RuntimeContext {
    /// Sends `message` to `receiver`.
    ///
    /// Class receivers get class methods, everything else instance methods.
    ///
    /// # Errors
    ///
    /// - [`Error::UnrecognizedSelector`] if the receiver has no such method
    ///   and the fallback policy is `Deny`
    /// - [`Error::ArgumentCountMismatch`] / [`Error::ArgumentTypeMismatch`]
    ///   if the arguments do not fit the resolved signature
    /// - [`Error::Exception`] if the runtime threw
    /// - any error returned by a host method body run during the call
    pub fn msg_send(&self, receiver: &Id, message: impl Into<Message>) -> Result<Value> {
        let message = message.into();
        let sel = self.selector(message.selector())?;
        // SAFETY: receiver is a live runtime object
        let method = unsafe {
            if receiver.is_class() {
                (self.api().class_get_class_method)(receiver.as_ptr(), sel.as_ptr())
            } else {
                let class = (self.api().object_get_class)(receiver.as_ptr());
                (self.api().class_get_instance_method)(class, sel.as_ptr())
            }
        };
        self.send(receiver, Target::Receiver, Method::from_raw(method), sel, &message)
    }

    /// Sends `message` to `receiver`, starting the lookup at the superclass
    /// of the receiver's class.
    ///
    /// # Errors
    ///
    /// See [`RuntimeContext::msg_send`].
    pub fn msg_send_super(&self, receiver: &Id, message: impl Into<Message>) -> Result<Value> {
        // SAFETY: receiver is a live runtime object
        let class = unsafe { (self.api().object_get_class)(receiver.as_ptr()) };
        self.send_super(receiver, class, message.into())
    }

    /// Sends `message` to `receiver`, starting the lookup at the superclass
    /// of `class`. Method bodies use this to call the inherited
    /// implementation of the class they were added to, which stays correct
    /// when the receiver is an instance of a further subclass.
    ///
    /// # Errors
    ///
    /// See [`RuntimeContext::msg_send`].
    pub fn msg_send_super_of(&self, receiver: &Id, class: &Class, message: impl Into<Message>) -> Result<Value> {
        let class = if receiver.is_class() {
            class.metaclass(self).map_or(std::ptr::null_mut(), |meta| meta.as_ptr())
        } else {
            class.as_ptr()
        };
        self.send_super(receiver, class, message.into())
    }

    fn send_super(&self, receiver: &Id, class: *mut std::ffi::c_void, message: Message) -> Result<Value> {
        let sel = self.selector(message.selector())?;
        // SAFETY: class is null or a runtime class
        let start = unsafe { (self.api().class_get_superclass)(class) };
        if start.is_null() {
            return Err(Error::UnrecognizedSelector {
                selector: message.selector().to_string(),
            });
        }
        // SAFETY: start is a runtime class
        let method = unsafe { (self.api().class_get_instance_method)(start, sel.as_ptr()) };
        let target = Target::Super(ObjcSuper {
            receiver: receiver.as_ptr(),
            super_class: start,
        });
        self.send(receiver, target, Method::from_raw(method), sel, &message)
    }

    fn send(&self, receiver: &Id, target: Target, method: Option<Method>, sel: Sel, message: &Message) -> Result<Value> {
        let name = message.selector();
        let frame = match method {
            Some(method) => self.method_frame(method)?,
            None => self.assumed_frame(receiver, name, message.args().len())?,
        };

        let expected = frame.signature().declared_arguments().len();
        if expected != message.args().len() {
            return Err(Error::ArgumentCountMismatch {
                selector: name.to_string(),
                expected,
                got: message.args().len(),
            });
        }

        // SAFETY: the receiver is live and the lookup functions accept any selector
        let imp = unsafe {
            match &target {
                Target::Receiver => (self.api().msg_lookup)(receiver.as_ptr(), sel.as_ptr()),
                Target::Super(sup) => (self.api().msg_lookup_super)(std::ptr::from_ref(sup), sel.as_ptr()),
            }
        };
        let Some(code) = imp else {
            return Err(Error::UnrecognizedSelector {
                selector: name.to_string(),
            });
        };

        trace!("{name} -> {:?} ({})", receiver, frame.signature().encoding());
        let prefix = [receiver.address(), sel.as_ptr() as usize];
        // SAFETY: the frame was built from the method's own type string, or
        // is the assumed shape when the method is unknown
        let ret = unsafe { frame.invoke(self, code, &prefix, message.args())? };
        self.complete(&frame, &ret)
    }

    /// Frames are keyed by the runtime's type string; methods without one
    /// are keyed by the encoding of their translated signature.
    fn method_frame(&self, method: Method) -> Result<Rc<CallFrame>> {
        if let Some(key) = method.type_encoding(self) {
            return self.frame(&key, || method.types(self));
        }
        let signature = method.types(self)?;
        let key = signature.encoding();
        self.frame(&key, move || Ok(signature))
    }

    fn assumed_frame(&self, receiver: &Id, selector: &str, argc: usize) -> Result<Rc<CallFrame>> {
        match self.config().fallback {
            FallbackPolicy::Deny => {
                return Err(Error::UnrecognizedSelector {
                    selector: selector.to_string(),
                });
            }
            FallbackPolicy::Warn => {
                warn!("no method for {selector} on {receiver:?}, assuming all-object signature");
            }
            FallbackPolicy::Assume => {
                debug!("no method for {selector} on {receiver:?}, assuming all-object signature");
            }
        }
        let signature = Signature::assumed(argc);
        self.frame(&signature.encoding(), || Ok(signature.clone()))
    }

    /// Collects what happened during a native call: a host error first,
    /// then a runtime exception, then the return value.
    pub(crate) fn complete(&self, frame: &CallFrame, ret: &[u64]) -> Result<Value> {
        if let Some(e) = self.take_pending_error() {
            // an exception raised alongside belongs to the same failure
            self.take_exception();
            return Err(e);
        }
        if let Some(exception) = self.take_exception() {
            let name = self.exception_field(&exception, "name");
            let reason = self.exception_field(&exception, "reason");
            error!(
                "native exception {}: {}",
                name.as_deref().unwrap_or("?"),
                reason.as_deref().unwrap_or("?")
            );
            return Err(Error::Exception { exception, name, reason });
        }
        frame.decode_return(self, ret)
    }

    fn take_exception(&self) -> Option<Id> {
        let take = self.api().exception_take?;
        // SAFETY: takes ownership of the pending exception, if any
        self.wrap(unsafe { take() })
    }

    fn exception_field(&self, exception: &Id, field: &str) -> Option<String> {
        if !exception.responds_to(self, field).unwrap_or(false) {
            return None;
        }
        match self.msg_send(exception, field) {
            Ok(Value::Str(s)) => Some(s),
            Ok(Value::Object(id)) => self.msg_send(&id, "UTF8String").ok().and_then(|v| v.as_str().map(str::to_string)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_keywords() {
        let msg = Message::keywords([("setX", 1), ("y", 2)]);
        assert_eq!(msg.selector(), "setX:y:");
        assert_eq!(msg.args(), &[Value::Int(1), Value::Int(2)]);

        let msg = Message::keywords([("performSelector:", Value::Selector("hash".into()))]);
        assert_eq!(msg.selector(), "performSelector:");
    }

    #[test]
    fn test_message_conversions() {
        let msg: Message = "alloc".into();
        assert_eq!(msg.selector(), "alloc");
        assert!(msg.args().is_empty());

        let msg: Message = vec![("isEqual", Value::Nil)].into();
        assert_eq!(msg.selector(), "isEqual:");
        assert_eq!(msg.args(), &[Value::Nil]);

        let msg = Message::new("a:b:").arg(true).arg(2.5);
        assert_eq!(msg.args(), &[Value::Bool(true), Value::Float(2.5)]);
        assert_eq!(Message::with_args("x:", vec![Value::UInt(3)]).args().len(), 1);
    }
}
