//! Type encoding translation.
//!
//! A type encoding is a compact description of one value's native shape, as
//! produced by `@encode` and stored in method type strings:
//!
//! - `c i s l q` / `C I S L Q` - signed / unsigned integers
//! - `f d` - float, double
//! - `B` - C99 bool
//! - `v` - void
//! - `*` - C string
//! - `@` - object (also `@"ClassName"` and `@?` blocks)
//! - `#` - class
//! - `:` - selector
//! - `?` - unknown (function pointers)
//! - `^T` - pointer to `T`
//! - `{Name=T...}` - struct, optionally with `"field"` names
//! - `r n N o O R V` - qualifiers, ignored
//!
//! Arrays (`[`), unions (`(`), bit-fields (`b`) and long doubles (`D`) are
//! recognised but unsupported and fail with [`Error::UnsupportedType`] when
//! they would be marshaled by value. Behind a pointer they are opaque like
//! every other pointee.
//!
//! Translation is pure: the only state involved is the set of struct layouts
//! registered with a [`Translator`]. Registered layouts let `{Name}` appear by
//! value and make `^{Name...}` pointers decode to the struct they point at.

#![allow(clippy::match_same_arms)]

use crate::error::{Error, Result};
use fxhash::FxHashMap;
use std::ffi::c_long;
use std::fmt;
use std::sync::Arc;

/// Type encoding characters.
pub mod codes {
    /// `char`
    pub const CHAR: u8 = b'c';
    /// `unsigned char`
    pub const UCHAR: u8 = b'C';
    /// `short`
    pub const SHORT: u8 = b's';
    /// `unsigned short`
    pub const USHORT: u8 = b'S';
    /// `int`
    pub const INT: u8 = b'i';
    /// `unsigned int`
    pub const UINT: u8 = b'I';
    /// `long`
    pub const LONG: u8 = b'l';
    /// `unsigned long`
    pub const ULONG: u8 = b'L';
    /// `long long`
    pub const LONG_LONG: u8 = b'q';
    /// `unsigned long long`
    pub const ULONG_LONG: u8 = b'Q';
    /// `float`
    pub const FLOAT: u8 = b'f';
    /// `double`
    pub const DOUBLE: u8 = b'd';
    /// C99 `bool`
    pub const BOOL: u8 = b'B';
    /// `void`
    pub const VOID: u8 = b'v';
    /// `char *`
    pub const CSTRING: u8 = b'*';
    /// `id`
    pub const OBJECT: u8 = b'@';
    /// `Class`
    pub const CLASS: u8 = b'#';
    /// `SEL`
    pub const SELECTOR: u8 = b':';
    /// Unknown type, typically a function pointer
    pub const UNKNOWN: u8 = b'?';
    /// Pointer prefix
    pub const POINTER: u8 = b'^';
    /// Struct start
    pub const STRUCT_BEGIN: u8 = b'{';
    /// Struct end
    pub const STRUCT_END: u8 = b'}';
    /// Array start (unsupported by value)
    pub const ARRAY_BEGIN: u8 = b'[';
    /// Union start (unsupported by value)
    pub const UNION_BEGIN: u8 = b'(';
    /// Bit-field prefix (unsupported by value)
    pub const BITFIELD: u8 = b'b';
    /// `long double` (unsupported by value)
    pub const LONG_DOUBLE: u8 = b'D';
    /// Method qualifiers (`const`, `in`, `inout`, `out`, `bycopy`, `byref`, `oneway`)
    pub const QUALIFIERS: &[u8] = b"rnNoORV";
}

/// Scalar kinds with a fixed native width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    /// `c`
    Char,
    /// `C`
    UChar,
    /// `s`
    Short,
    /// `S`
    UShort,
    /// `i`
    Int,
    /// `I`
    UInt,
    /// `l`, the platform `long`
    Long,
    /// `L`
    ULong,
    /// `q`
    LongLong,
    /// `Q`
    ULongLong,
    /// `f`
    Float,
    /// `d`
    Double,
    /// `B`
    Bool,
    /// `v`
    Void,
}

impl Primitive {
    /// Maps an encoding character to its primitive kind.
    pub const fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            codes::CHAR => Primitive::Char,
            codes::UCHAR => Primitive::UChar,
            codes::SHORT => Primitive::Short,
            codes::USHORT => Primitive::UShort,
            codes::INT => Primitive::Int,
            codes::UINT => Primitive::UInt,
            codes::LONG => Primitive::Long,
            codes::ULONG => Primitive::ULong,
            codes::LONG_LONG => Primitive::LongLong,
            codes::ULONG_LONG => Primitive::ULongLong,
            codes::FLOAT => Primitive::Float,
            codes::DOUBLE => Primitive::Double,
            codes::BOOL => Primitive::Bool,
            codes::VOID => Primitive::Void,
            _ => return None,
        })
    }

    /// Size in bytes. `Void` is zero.
    pub const fn size(self) -> usize {
        match self {
            Primitive::Char | Primitive::UChar | Primitive::Bool => 1,
            Primitive::Short | Primitive::UShort => 2,
            Primitive::Int | Primitive::UInt | Primitive::Float => 4,
            Primitive::Long | Primitive::ULong => std::mem::size_of::<c_long>(),
            Primitive::LongLong | Primitive::ULongLong | Primitive::Double => 8,
            Primitive::Void => 0,
        }
    }

    /// True for signed integer kinds.
    pub const fn is_signed(self) -> bool {
        matches!(
            self,
            Primitive::Char | Primitive::Short | Primitive::Int | Primitive::Long | Primitive::LongLong
        )
    }

    /// True for `f` and `d`.
    pub const fn is_float(self) -> bool {
        matches!(self, Primitive::Float | Primitive::Double)
    }
}

/// How a value is moved across the call boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarshalKind {
    /// A scalar of fixed width.
    Primitive(Primitive),
    /// An object reference, wrapped through the identity cache.
    Object,
    /// A class reference, wrapped through the identity cache.
    Class,
    /// A selector, exchanged as its name.
    Selector,
    /// A NUL-terminated C string.
    CString,
    /// Any other pointer. Decodes to a struct when the pointee layout is known.
    Pointer,
    /// A struct passed by value.
    Aggregate,
}

/// One field of an [`AggregateLayout`].
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    /// Field name, when the encoding or metadata provides one.
    pub name: Option<String>,
    /// Shape of the field.
    pub descriptor: MarshalDescriptor,
    /// Byte offset inside the struct.
    pub offset: usize,
}

/// C layout of a struct: ordered fields with computed offsets.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateLayout {
    name: String,
    fields: Vec<Field>,
    size: usize,
    align: usize,
}

impl AggregateLayout {
    /// Lays out `fields` with C rules: each field at the next multiple of its
    /// alignment, total size rounded up to the largest alignment.
    pub fn new(name: impl Into<String>, fields: Vec<(Option<String>, MarshalDescriptor)>) -> Self {
        let mut offset: usize = 0;
        let mut align: usize = 1;
        let fields = fields
            .into_iter()
            .map(|(name, descriptor)| {
                let field_align = descriptor.alignment();
                offset = offset.next_multiple_of(field_align);
                let field = Field {
                    name,
                    offset,
                    descriptor,
                };
                offset += field.descriptor.size();
                align = align.max(field_align);
                field
            })
            .collect();

        AggregateLayout {
            name: name.into(),
            fields,
            size: offset.next_multiple_of(align),
            align,
        }
    }

    /// Struct name, `?` for anonymous structs.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fields in declaration order.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Total size in bytes, including tail padding.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Alignment in bytes.
    pub fn alignment(&self) -> usize {
        self.align
    }

    /// Index of the field called `name`.
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name.as_deref() == Some(name))
    }
}

/// The translated shape of one type encoding.
#[derive(Debug, Clone, PartialEq)]
pub struct MarshalDescriptor {
    encoding: String,
    kind: MarshalKind,
    indirection: u8,
    layout: Option<Arc<AggregateLayout>>,
    class_name: Option<String>,
}

impl MarshalDescriptor {
    fn new(encoding: &str, kind: MarshalKind) -> Self {
        MarshalDescriptor {
            encoding: encoding.to_string(),
            kind,
            indirection: 0,
            layout: None,
            class_name: None,
        }
    }

    /// Descriptor for a scalar.
    pub fn primitive(primitive: Primitive) -> Self {
        let code = match primitive {
            Primitive::Char => codes::CHAR,
            Primitive::UChar => codes::UCHAR,
            Primitive::Short => codes::SHORT,
            Primitive::UShort => codes::USHORT,
            Primitive::Int => codes::INT,
            Primitive::UInt => codes::UINT,
            Primitive::Long => codes::LONG,
            Primitive::ULong => codes::ULONG,
            Primitive::LongLong => codes::LONG_LONG,
            Primitive::ULongLong => codes::ULONG_LONG,
            Primitive::Float => codes::FLOAT,
            Primitive::Double => codes::DOUBLE,
            Primitive::Bool => codes::BOOL,
            Primitive::Void => codes::VOID,
        };
        MarshalDescriptor::new(&char::from(code).to_string(), MarshalKind::Primitive(primitive))
    }

    /// Descriptor for a plain object reference (`@`).
    pub fn object() -> Self {
        MarshalDescriptor::new("@", MarshalKind::Object)
    }

    /// Descriptor for a selector (`:`).
    pub fn selector() -> Self {
        MarshalDescriptor::new(":", MarshalKind::Selector)
    }

    /// Descriptor for a struct passed by value.
    pub fn aggregate(encoding: &str, layout: Arc<AggregateLayout>) -> Self {
        let mut descriptor = MarshalDescriptor::new(encoding, MarshalKind::Aggregate);
        descriptor.layout = Some(layout);
        descriptor
    }

    /// The encoding this descriptor was translated from, qualifiers stripped.
    pub fn encoding(&self) -> &str {
        &self.encoding
    }

    /// How the value crosses the call boundary.
    pub fn kind(&self) -> MarshalKind {
        self.kind
    }

    /// Number of pointer levels; zero for non-pointers.
    pub fn indirection(&self) -> u8 {
        self.indirection
    }

    /// Struct layout for aggregates, or the pointee layout for a pointer to a
    /// registered struct.
    pub fn layout(&self) -> Option<&Arc<AggregateLayout>> {
        self.layout.as_ref()
    }

    /// Class named in an `@"ClassName"` encoding.
    pub fn class_name(&self) -> Option<&str> {
        self.class_name.as_deref()
    }

    /// The primitive kind, if this is a scalar.
    pub fn primitive_kind(&self) -> Option<Primitive> {
        match self.kind {
            MarshalKind::Primitive(p) => Some(p),
            _ => None,
        }
    }

    /// True for `v`.
    pub fn is_void(&self) -> bool {
        self.kind == MarshalKind::Primitive(Primitive::Void)
    }

    /// Size in bytes of the native value.
    pub fn size(&self) -> usize {
        match self.kind {
            MarshalKind::Primitive(p) => p.size(),
            MarshalKind::Aggregate => self.layout.as_ref().map_or(0, |l| l.size()),
            _ => std::mem::size_of::<usize>(),
        }
    }

    /// Alignment in bytes of the native value.
    pub fn alignment(&self) -> usize {
        match self.kind {
            MarshalKind::Primitive(p) => p.size().max(1),
            MarshalKind::Aggregate => self.layout.as_ref().map_or(1, |l| l.alignment()),
            _ => std::mem::align_of::<usize>(),
        }
    }
}

impl fmt::Display for MarshalDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encoding)
    }
}

/// A resolved call shape: return type plus every argument, receiver and
/// selector included for method signatures.
#[derive(Debug, Clone, PartialEq)]
pub struct Signature {
    ret: MarshalDescriptor,
    args: Vec<MarshalDescriptor>,
}

impl Signature {
    /// Creates a signature without checking for the method prefix.
    pub fn new(ret: MarshalDescriptor, args: Vec<MarshalDescriptor>) -> Self {
        Signature { ret, args }
    }

    /// Creates a method signature, requiring `@` and `:` as the first two arguments.
    pub fn method(ret: MarshalDescriptor, args: Vec<MarshalDescriptor>) -> Result<Self> {
        let signature = Signature { ret, args };
        if signature.is_method() {
            Ok(signature)
        } else {
            Err(Error::InvalidSignature {
                signature: signature.encoding(),
            })
        }
    }

    /// The all-object signature assumed for selectors without metadata:
    /// returns `@`, takes `@ :` and then `argc` more `@`s.
    pub fn assumed(argc: usize) -> Self {
        let mut args = Vec::with_capacity(argc + 2);
        args.push(MarshalDescriptor::object());
        args.push(MarshalDescriptor::selector());
        args.extend(std::iter::repeat_with(MarshalDescriptor::object).take(argc));
        Signature {
            ret: MarshalDescriptor::object(),
            args,
        }
    }

    /// The return descriptor.
    pub fn return_type(&self) -> &MarshalDescriptor {
        &self.ret
    }

    /// All argument descriptors.
    pub fn arguments(&self) -> &[MarshalDescriptor] {
        &self.args
    }

    /// True if the first two arguments are an object and a selector.
    pub fn is_method(&self) -> bool {
        self.args.len() >= 2
            && self.args[0].kind == MarshalKind::Object
            && self.args[1].kind == MarshalKind::Selector
    }

    /// Arguments after the receiver and selector.
    pub fn declared_arguments(&self) -> &[MarshalDescriptor] {
        if self.is_method() { &self.args[2..] } else { &self.args }
    }

    /// The flattened type string: return type followed by every argument.
    pub fn encoding(&self) -> String {
        std::iter::once(&self.ret)
            .chain(&self.args)
            .map(MarshalDescriptor::encoding)
            .collect()
    }
}

// ============================================================================
// Translator
// ============================================================================

/// Translates encodings, resolving struct names against registered layouts.
#[derive(Debug, Clone, Default)]
pub struct Translator {
    structs: FxHashMap<String, Arc<AggregateLayout>>,
}

impl Translator {
    /// Creates a translator with no registered layouts.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `layout` under its name, replacing any previous layout.
    pub fn register(&mut self, layout: AggregateLayout) -> Arc<AggregateLayout> {
        let layout = Arc::new(layout);
        self.structs.insert(layout.name.clone(), Arc::clone(&layout));
        layout
    }

    /// Registers an already shared layout under its name.
    pub fn insert(&mut self, layout: Arc<AggregateLayout>) {
        self.structs.insert(layout.name.clone(), layout);
    }

    /// Parses a struct encoding such as `{CGPoint="x"d"y"d}` and registers it.
    ///
    /// # Errors
    ///
    /// Fails if `encoding` is not a by-value struct encoding.
    pub fn register_encoding(&mut self, encoding: &str) -> Result<Arc<AggregateLayout>> {
        let descriptor = self.translate(encoding)?;
        match descriptor.layout {
            Some(layout) if descriptor.kind == MarshalKind::Aggregate => {
                self.structs.insert(layout.name.clone(), Arc::clone(&layout));
                Ok(layout)
            }
            _ => Err(Error::MalformedEncoding {
                encoding: encoding.to_string(),
                reason: "expected a struct encoding".into(),
            }),
        }
    }

    /// Returns the layout registered as `name`.
    pub fn layout(&self, name: &str) -> Option<Arc<AggregateLayout>> {
        self.structs.get(name).cloned()
    }

    /// Translates a single type encoding.
    ///
    /// # Errors
    ///
    /// - [`Error::UnsupportedType`] for arrays, unions, bit-fields and long doubles
    /// - [`Error::UnknownAggregate`] for `{Name}` without a registered layout
    /// - [`Error::MalformedEncoding`] for anything else outside the grammar
    pub fn translate(&self, encoding: &str) -> Result<MarshalDescriptor> {
        let mut parser = Parser::new(self, encoding);
        parser.check_unsupported_prefix()?;
        let descriptor = parser.parse_type(false)?;
        if parser.pos != parser.bytes.len() {
            return Err(parser.malformed("trailing characters after type"));
        }
        Ok(descriptor)
    }

    /// Translates each encoding in order.
    ///
    /// # Errors
    ///
    /// Returns the first translation error.
    pub fn translate_sequence<S: AsRef<str>>(&self, encodings: &[S]) -> Result<Vec<MarshalDescriptor>> {
        encodings.iter().map(|e| self.translate(e.as_ref())).collect()
    }

    /// Splits a concatenated type string (offsets allowed) into descriptors.
    ///
    /// # Errors
    ///
    /// Returns the first translation error.
    pub fn split(&self, types: &str) -> Result<Vec<MarshalDescriptor>> {
        let mut parser = Parser::new(self, types);
        let mut out = Vec::new();
        while parser.pos < parser.bytes.len() {
            parser.check_unsupported_prefix()?;
            out.push(parser.parse_type(false)?);
            parser.skip_offset();
        }
        Ok(out)
    }

    /// Parses a method type string such as `"v@:"` or `"c24@0:8i16"`.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::InvalidSignature`] when the return type is not
    /// followed by `@` and `:`, or with a translation error.
    pub fn parse_signature(&self, signature: &str) -> Result<Signature> {
        let mut values = self.split(signature)?.into_iter();
        let Some(ret) = values.next() else {
            return Err(Error::InvalidSignature {
                signature: signature.to_string(),
            });
        };
        Signature::method(ret, values.collect()).map_err(|_| Error::InvalidSignature {
            signature: signature.to_string(),
        })
    }

    /// Builds a method signature from separately copied return and argument types.
    ///
    /// # Errors
    ///
    /// Same as [`Translator::parse_signature`].
    pub fn signature_from_parts<S: AsRef<str>>(&self, ret: &str, args: &[S]) -> Result<Signature> {
        Signature::method(self.translate(ret)?, self.translate_sequence(args)?)
    }
}

/// Translates `encoding` with no registered struct layouts.
///
/// # Errors
///
/// See [`Translator::translate`].
pub fn translate(encoding: &str) -> Result<MarshalDescriptor> {
    Translator::new().translate(encoding)
}

/// Translates each encoding with no registered struct layouts.
///
/// # Errors
///
/// See [`Translator::translate_sequence`].
pub fn translate_sequence<S: AsRef<str>>(encodings: &[S]) -> Result<Vec<MarshalDescriptor>> {
    Translator::new().translate_sequence(encodings)
}

/// Parses a method type string with no registered struct layouts.
///
/// # Errors
///
/// See [`Translator::parse_signature`].
pub fn parse_signature(signature: &str) -> Result<Signature> {
    Translator::new().parse_signature(signature)
}

// ============================================================================
// Parser
// ============================================================================

struct Parser<'a> {
    translator: &'a Translator,
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(translator: &'a Translator, src: &'a str) -> Self {
        Parser {
            translator,
            src,
            bytes: src.as_bytes(),
            pos: 0,
        }
    }

    fn malformed(&self, reason: &str) -> Error {
        Error::MalformedEncoding {
            encoding: self.src.to_string(),
            reason: format!("{reason} at offset {}", self.pos),
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn skip_qualifiers(&mut self) {
        while self.peek().is_some_and(|b| codes::QUALIFIERS.contains(&b)) {
            self.pos += 1;
        }
    }

    fn skip_offset(&mut self) {
        while self.peek().is_some_and(|b| b.is_ascii_digit() || b == b'-') {
            self.pos += 1;
        }
    }

    /// Unsupported shapes fail with `UnsupportedType` before any other check.
    fn check_unsupported_prefix(&mut self) -> Result<()> {
        let mut probe = self.pos;
        while self.bytes.get(probe).is_some_and(|b| codes::QUALIFIERS.contains(b)) {
            probe += 1;
        }
        match self.bytes.get(probe) {
            Some(&(codes::ARRAY_BEGIN | codes::UNION_BEGIN | codes::BITFIELD | codes::LONG_DOUBLE)) => {
                Err(Error::UnsupportedType {
                    encoding: self.src[probe..].to_string(),
                })
            }
            _ => Ok(()),
        }
    }

    fn parse_type(&mut self, in_named_struct: bool) -> Result<MarshalDescriptor> {
        self.skip_qualifiers();
        let start = self.pos;
        let Some(code) = self.peek() else {
            return Err(self.malformed("unexpected end of encoding"));
        };
        self.pos += 1;

        if let Some(primitive) = Primitive::from_code(code) {
            return Ok(MarshalDescriptor::new(&self.src[start..self.pos], MarshalKind::Primitive(primitive)));
        }

        match code {
            codes::OBJECT => {
                let mut class_name = None;
                match self.peek() {
                    Some(codes::UNKNOWN) => self.pos += 1,
                    Some(b'"') if !in_named_struct => {
                        let close = self.find_quote(self.pos + 1)?;
                        class_name = Some(self.src[self.pos + 1..close].to_string());
                        self.pos = close + 1;
                    }
                    _ => {}
                }
                let mut descriptor = MarshalDescriptor::new(&self.src[start..self.pos], MarshalKind::Object);
                descriptor.class_name = class_name;
                Ok(descriptor)
            }
            codes::CLASS => Ok(MarshalDescriptor::new("#", MarshalKind::Class)),
            codes::SELECTOR => Ok(MarshalDescriptor::new(":", MarshalKind::Selector)),
            codes::CSTRING => Ok(MarshalDescriptor::new("*", MarshalKind::CString)),
            codes::UNKNOWN => {
                let mut descriptor = MarshalDescriptor::new("?", MarshalKind::Pointer);
                descriptor.indirection = 1;
                Ok(descriptor)
            }
            codes::POINTER => self.parse_pointer(start),
            codes::STRUCT_BEGIN => self.parse_struct(start),
            codes::ARRAY_BEGIN | codes::UNION_BEGIN | codes::BITFIELD | codes::LONG_DOUBLE => {
                Err(Error::UnsupportedType {
                    encoding: self.src[start..].to_string(),
                })
            }
            _ => {
                self.pos = start;
                Err(self.malformed(&format!("unknown type code '{}'", char::from(code))))
            }
        }
    }

    fn parse_pointer(&mut self, start: usize) -> Result<MarshalDescriptor> {
        let mut levels: u8 = 1;
        loop {
            self.skip_qualifiers();
            if self.peek() == Some(codes::POINTER) {
                levels = levels.saturating_add(1);
                self.pos += 1;
            } else {
                break;
            }
        }

        let layout = match self.peek() {
            None => return Err(self.malformed("pointer without a pointee")),
            Some(codes::STRUCT_BEGIN) => {
                let name = self.skip_struct_by_name()?;
                if levels == 1 { self.translator.layout(&name) } else { None }
            }
            Some(codes::ARRAY_BEGIN) => {
                self.skip_group(codes::ARRAY_BEGIN, b']')?;
                None
            }
            Some(codes::UNION_BEGIN) => {
                self.skip_group(codes::UNION_BEGIN, b')')?;
                None
            }
            Some(codes::BITFIELD) => {
                self.pos += 1;
                self.skip_offset();
                None
            }
            Some(codes::LONG_DOUBLE) => {
                self.pos += 1;
                None
            }
            Some(_) => {
                self.parse_type(false)?;
                None
            }
        };

        let mut descriptor = MarshalDescriptor::new(&self.src[start..self.pos], MarshalKind::Pointer);
        descriptor.indirection = levels;
        descriptor.layout = layout;
        Ok(descriptor)
    }

    fn parse_struct(&mut self, start: usize) -> Result<MarshalDescriptor> {
        let name_start = self.pos;
        while self
            .peek()
            .is_some_and(|b| b != b'=' && b != codes::STRUCT_END)
        {
            self.pos += 1;
        }
        let name = self.src[name_start..self.pos].to_string();

        match self.peek() {
            None => Err(self.malformed("unterminated struct")),
            Some(codes::STRUCT_END) => {
                self.pos += 1;
                match self.translator.layout(&name) {
                    Some(layout) => Ok(MarshalDescriptor::aggregate(&self.src[start..self.pos], layout)),
                    None => Err(Error::UnknownAggregate { name }),
                }
            }
            Some(_) => {
                self.pos += 1;
                let named = self.peek() == Some(b'"');
                let mut fields = Vec::new();
                loop {
                    match self.peek() {
                        None => return Err(self.malformed("unterminated struct")),
                        Some(codes::STRUCT_END) => {
                            self.pos += 1;
                            break;
                        }
                        Some(_) => {
                            let field_name = if named { Some(self.parse_field_name()?) } else { None };
                            let descriptor = self.parse_type(named)?;
                            if descriptor.is_void() {
                                return Err(self.malformed("void struct field"));
                            }
                            fields.push((field_name, descriptor));
                        }
                    }
                }

                let encoding = &self.src[start..self.pos];
                if fields.is_empty() {
                    return Err(Error::UnsupportedType {
                        encoding: encoding.to_string(),
                    });
                }
                let layout = AggregateLayout::new(name, fields);
                // an anonymous-field body takes its names from a matching registered layout
                if !named {
                    if let Some(registered) = self.translator.layout(&layout.name) {
                        if registered.size() == layout.size() && registered.fields().len() == layout.fields().len() {
                            return Ok(MarshalDescriptor::aggregate(encoding, registered));
                        }
                    }
                }
                Ok(MarshalDescriptor::aggregate(encoding, Arc::new(layout)))
            }
        }
    }

    fn parse_field_name(&mut self) -> Result<String> {
        if self.peek() != Some(b'"') {
            return Err(self.malformed("expected a quoted field name"));
        }
        let close = self.find_quote(self.pos + 1)?;
        let name = self.src[self.pos + 1..close].to_string();
        self.pos = close + 1;
        Ok(name)
    }

    fn find_quote(&self, from: usize) -> Result<usize> {
        self.bytes[from.min(self.bytes.len())..]
            .iter()
            .position(|&b| b == b'"')
            .map(|offset| from + offset)
            .ok_or_else(|| self.malformed("unterminated quote"))
    }

    /// Skips a struct behind a pointer, returning its name.
    fn skip_struct_by_name(&mut self) -> Result<String> {
        let start = self.pos + 1;
        let end = self.bytes[start..]
            .iter()
            .position(|&b| b == b'=' || b == codes::STRUCT_END)
            .map(|offset| start + offset)
            .ok_or_else(|| self.malformed("unterminated struct"))?;
        let name = self.src[start..end].to_string();
        self.skip_group(codes::STRUCT_BEGIN, codes::STRUCT_END)?;
        Ok(name)
    }

    fn skip_group(&mut self, open: u8, close: u8) -> Result<()> {
        let mut depth = 0usize;
        let mut in_quote = false;
        while let Some(b) = self.peek() {
            self.pos += 1;
            if b == b'"' {
                in_quote = !in_quote;
            } else if in_quote {
                continue;
            } else if b == open {
                depth += 1;
            } else if b == close {
                depth -= 1;
                if depth == 0 {
                    return Ok(());
                }
            }
        }
        Err(self.malformed("unbalanced brackets"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCALARS: &str = "cCsSiIlLqQfdBv";

    #[test]
    fn test_primitives_translate() {
        for code in SCALARS.chars() {
            let encoding = code.to_string();
            let descriptor = translate(&encoding).unwrap();
            assert_eq!(descriptor.encoding(), encoding);
            assert!(matches!(descriptor.kind(), MarshalKind::Primitive(_)));
            assert_eq!(translate(&encoding).unwrap(), descriptor, "deterministic for {code}");
        }
        assert_eq!(translate("q").unwrap().size(), 8);
        assert_eq!(translate("S").unwrap().size(), 2);
        assert!(translate("c").unwrap().primitive_kind().unwrap().is_signed());
        assert!(!translate("C").unwrap().primitive_kind().unwrap().is_signed());
    }

    #[test]
    fn test_references_translate() {
        assert_eq!(translate("@").unwrap().kind(), MarshalKind::Object);
        assert_eq!(translate("#").unwrap().kind(), MarshalKind::Class);
        assert_eq!(translate(":").unwrap().kind(), MarshalKind::Selector);
        assert_eq!(translate("*").unwrap().kind(), MarshalKind::CString);
        assert_eq!(translate("?").unwrap().kind(), MarshalKind::Pointer);
        assert_eq!(translate("@?").unwrap().kind(), MarshalKind::Object);

        let named = translate("@\"NSString\"").unwrap();
        assert_eq!(named.kind(), MarshalKind::Object);
        assert_eq!(named.class_name(), Some("NSString"));
    }

    #[test]
    fn test_qualifiers_are_ignored() {
        let descriptor = translate("r*").unwrap();
        assert_eq!(descriptor.kind(), MarshalKind::CString);
        assert_eq!(descriptor.encoding(), "*");
        assert_eq!(translate("Vv").unwrap().encoding(), "v");
    }

    #[test]
    fn test_pointers_are_opaque() {
        let p = translate("^i").unwrap();
        assert_eq!(p.kind(), MarshalKind::Pointer);
        assert_eq!(p.indirection(), 1);
        assert!(p.layout().is_none());

        assert_eq!(translate("^^v").unwrap().indirection(), 2);
        assert_eq!(translate("^{CGPoint=dd}").unwrap().layout(), None);
        assert_eq!(translate("^{__CFString}").unwrap().kind(), MarshalKind::Pointer);
        assert_eq!(translate("^[4i]").unwrap().kind(), MarshalKind::Pointer);
        assert_eq!(translate("^(u=if)").unwrap().kind(), MarshalKind::Pointer);
        assert_eq!(translate("^?").unwrap().kind(), MarshalKind::Pointer);
    }

    #[test]
    fn test_pointer_to_registered_struct() {
        let mut translator = Translator::new();
        translator.register_encoding("{CGPoint=dd}").unwrap();

        let p = translator.translate("^{CGPoint=dd}").unwrap();
        assert_eq!(p.layout().unwrap().name(), "CGPoint");
        let opaque = translator.translate("^{CGPoint}").unwrap();
        assert_eq!(opaque.layout().unwrap().size(), 16);
        assert!(translator.translate("^^{CGPoint}").unwrap().layout().is_none());
    }

    #[test]
    fn test_anonymous_body_reuses_registered_names() {
        let mut translator = Translator::new();
        translator.register_encoding("{Point=\"x\"d\"y\"d}").unwrap();

        let by_value = translator.translate("{Point=dd}").unwrap();
        assert_eq!(by_value.layout().unwrap().field_index("y"), Some(1));
        assert_eq!(by_value.encoding(), "{Point=dd}");

        // a different shape under the same name keeps its own layout
        let other = translator.translate("{Point=ii}").unwrap();
        assert_eq!(other.size(), 8);
        assert_eq!(other.layout().unwrap().field_index("x"), None);
    }

    #[test]
    fn test_struct_layout() {
        let descriptor = translate("{Mixed=cid^v}").unwrap();
        let layout = descriptor.layout().unwrap();
        assert_eq!(layout.name(), "Mixed");
        let offsets: Vec<usize> = layout.fields().iter().map(|f| f.offset).collect();
        assert_eq!(offsets, vec![0, 4, 8, 16]);
        assert_eq!(layout.size(), 24);
        assert_eq!(layout.alignment(), 8);

        let tail = translate("{Tail=dc}").unwrap();
        assert_eq!(tail.size(), 16, "size rounds up to alignment");
    }

    #[test]
    fn test_named_and_nested_structs() {
        let descriptor = translate("{CGRect=\"origin\"{CGPoint=\"x\"d\"y\"d}\"size\"{CGSize=\"width\"d\"height\"d}}").unwrap();
        let layout = descriptor.layout().unwrap();
        assert_eq!(layout.field_index("size"), Some(1));
        assert_eq!(layout.fields()[1].offset, 16);
        let origin = layout.fields()[0].descriptor.layout().unwrap();
        assert_eq!(origin.field_index("y"), Some(1));
        assert_eq!(layout.size(), 32);
    }

    #[test]
    fn test_named_struct_with_object_field() {
        let descriptor = translate("{Pair=\"key\"@\"value\"q}").unwrap();
        let layout = descriptor.layout().unwrap();
        assert_eq!(layout.fields().len(), 2);
        assert_eq!(layout.fields()[0].descriptor.kind(), MarshalKind::Object);
        assert_eq!(layout.fields()[1].name.as_deref(), Some("value"));
    }

    #[test]
    fn test_unsupported_prefixes() {
        for encoding in ["[4i]", "(Value=if)", "b8", "D", "[", "(", "b", "r[2c]", "[[[", "(unterminated"] {
            match translate(encoding) {
                Err(Error::UnsupportedType { .. }) => {}
                other => panic!("{encoding}: expected UnsupportedType, got {other:?}"),
            }
        }
        assert!(matches!(
            translate("{Inner=i[2c]}"),
            Err(Error::UnsupportedType { .. })
        ));
        assert!(matches!(translate("{Empty=}"), Err(Error::UnsupportedType { .. })));
    }

    #[test]
    fn test_malformed_encodings() {
        for encoding in ["", "x", "ii", "{Open=i", "^", "@\"Unclosed", "{Bad=v}"] {
            assert!(
                matches!(translate(encoding), Err(Error::MalformedEncoding { .. })),
                "{encoding} should be malformed"
            );
        }
    }

    #[test]
    fn test_unknown_aggregate_by_value() {
        assert_eq!(
            translate("{CGPoint}"),
            Err(Error::UnknownAggregate {
                name: "CGPoint".into()
            })
        );
    }

    #[test]
    fn test_parse_signature() {
        let signature = parse_signature("v@:").unwrap();
        assert!(signature.return_type().is_void());
        assert_eq!(signature.arguments().len(), 2);
        assert!(signature.declared_arguments().is_empty());

        let with_offsets = parse_signature("c24@0:8i16").unwrap();
        assert_eq!(with_offsets.encoding(), "c@:i");
        assert_eq!(with_offsets.declared_arguments().len(), 1);
    }

    #[test]
    fn test_parse_signature_requires_receiver_and_selector() {
        for signature in ["v", "v:@", "vi:", "@@", "v#:"] {
            assert!(
                matches!(parse_signature(signature), Err(Error::InvalidSignature { .. })),
                "{signature}"
            );
        }
    }

    #[test]
    fn test_assumed_signature() {
        let signature = Signature::assumed(2);
        assert_eq!(signature.encoding(), "@@:@@");
        assert!(signature.is_method());
    }

    #[test]
    fn test_translate_sequence() {
        let descriptors = translate_sequence(&["i", "^v", "{P=ff}"]).unwrap();
        assert_eq!(descriptors.len(), 3);
        assert_eq!(descriptors[2].size(), 8);
        assert!(translate_sequence(&["i", "[2i]"]).is_err());
    }
}
