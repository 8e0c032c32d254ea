//! Typed attribute buffers and attribute descriptors.

use std::fmt;
use std::rc::Rc;

use geoverlay_core::{OverlayError, Result};

use crate::layer::Layer;

/// Numeric element type of an attribute buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ElementType {
    #[default]
    Float32,
    Float64,
    Uint8,
    Uint16,
    Uint32,
    Int8,
    Int16,
    Int32,
}

impl ElementType {
    pub fn name(self) -> &'static str {
        match self {
            ElementType::Float32 => "f32",
            ElementType::Float64 => "f64",
            ElementType::Uint8 => "u8",
            ElementType::Uint16 => "u16",
            ElementType::Uint32 => "u32",
            ElementType::Int8 => "i8",
            ElementType::Int16 => "i16",
            ElementType::Int32 => "i32",
        }
    }

    /// Size of one element in bytes.
    pub fn byte_size(self) -> usize {
        match self {
            ElementType::Uint8 | ElementType::Int8 => 1,
            ElementType::Uint16 | ElementType::Int16 => 2,
            ElementType::Float32 | ElementType::Uint32 | ElementType::Int32 => 4,
            ElementType::Float64 => 8,
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A flat numeric buffer holding `size` components per vertex or instance.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeBuffer {
    Float32(Vec<f32>),
    Float64(Vec<f64>),
    Uint8(Vec<u8>),
    Uint16(Vec<u16>),
    Uint32(Vec<u32>),
    Int8(Vec<i8>),
    Int16(Vec<i16>),
    Int32(Vec<i32>),
}

macro_rules! buffer_accessors {
    ($($variant:ident => $ty:ty, $get:ident, $get_mut:ident;)*) => {
        impl AttributeBuffer {
            $(
                pub fn $get(&self) -> Option<&[$ty]> {
                    match self {
                        AttributeBuffer::$variant(values) => Some(values),
                        _ => None,
                    }
                }

                pub fn $get_mut(&mut self) -> Option<&mut [$ty]> {
                    match self {
                        AttributeBuffer::$variant(values) => Some(values),
                        _ => None,
                    }
                }
            )*
        }

        $(
            impl From<Vec<$ty>> for AttributeBuffer {
                fn from(values: Vec<$ty>) -> Self {
                    AttributeBuffer::$variant(values)
                }
            }
        )*
    };
}

buffer_accessors! {
    Float32 => f32, as_f32, as_f32_mut;
    Float64 => f64, as_f64, as_f64_mut;
    Uint8 => u8, as_u8, as_u8_mut;
    Uint16 => u16, as_u16, as_u16_mut;
    Uint32 => u32, as_u32, as_u32_mut;
    Int8 => i8, as_i8, as_i8_mut;
    Int16 => i16, as_i16, as_i16_mut;
    Int32 => i32, as_i32, as_i32_mut;
}

impl AttributeBuffer {
    /// Allocates a zero-filled buffer of `len` elements.
    pub fn zeroed(element_type: ElementType, len: usize) -> Self {
        match element_type {
            ElementType::Float32 => AttributeBuffer::Float32(vec![0.0; len]),
            ElementType::Float64 => AttributeBuffer::Float64(vec![0.0; len]),
            ElementType::Uint8 => AttributeBuffer::Uint8(vec![0; len]),
            ElementType::Uint16 => AttributeBuffer::Uint16(vec![0; len]),
            ElementType::Uint32 => AttributeBuffer::Uint32(vec![0; len]),
            ElementType::Int8 => AttributeBuffer::Int8(vec![0; len]),
            ElementType::Int16 => AttributeBuffer::Int16(vec![0; len]),
            ElementType::Int32 => AttributeBuffer::Int32(vec![0; len]),
        }
    }

    pub fn element_type(&self) -> ElementType {
        match self {
            AttributeBuffer::Float32(_) => ElementType::Float32,
            AttributeBuffer::Float64(_) => ElementType::Float64,
            AttributeBuffer::Uint8(_) => ElementType::Uint8,
            AttributeBuffer::Uint16(_) => ElementType::Uint16,
            AttributeBuffer::Uint32(_) => ElementType::Uint32,
            AttributeBuffer::Int8(_) => ElementType::Int8,
            AttributeBuffer::Int16(_) => ElementType::Int16,
            AttributeBuffer::Int32(_) => ElementType::Int32,
        }
    }

    /// Number of elements (not bytes).
    pub fn len(&self) -> usize {
        match self {
            AttributeBuffer::Float32(v) => v.len(),
            AttributeBuffer::Float64(v) => v.len(),
            AttributeBuffer::Uint8(v) => v.len(),
            AttributeBuffer::Uint16(v) => v.len(),
            AttributeBuffer::Uint32(v) => v.len(),
            AttributeBuffer::Int8(v) => v.len(),
            AttributeBuffer::Int16(v) => v.len(),
            AttributeBuffer::Int32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw bytes for GPU upload.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            AttributeBuffer::Float32(v) => bytemuck::cast_slice(v),
            AttributeBuffer::Float64(v) => bytemuck::cast_slice(v),
            AttributeBuffer::Uint8(v) => v,
            AttributeBuffer::Uint16(v) => bytemuck::cast_slice(v),
            AttributeBuffer::Uint32(v) => bytemuck::cast_slice(v),
            AttributeBuffer::Int8(v) => bytemuck::cast_slice(v),
            AttributeBuffer::Int16(v) => bytemuck::cast_slice(v),
            AttributeBuffer::Int32(v) => bytemuck::cast_slice(v),
        }
    }
}

/// Arguments passed to an attribute updater.
pub struct UpdateArgs<'a, C: ?Sized> {
    /// The object that owns the attributes, usually the layer.
    pub context: &'a C,
    pub num_instances: usize,
    /// Components per instance.
    pub size: usize,
}

impl UpdateArgs<'_, dyn Layer> {
    /// Downcasts the owning layer to its concrete type.
    pub fn layer<L: Layer>(&self) -> Option<&L> {
        self.context.as_any().downcast_ref::<L>()
    }
}

/// Fills an attribute buffer from the context's data.
pub type UpdateFn<C> = Rc<dyn Fn(&mut AttributeBuffer, &UpdateArgs<'_, C>)>;

/// Registration parameters for one attribute.
pub struct AttributeDescriptor<C: ?Sized = dyn Layer> {
    pub(crate) size: usize,
    pub(crate) element_type: ElementType,
    pub(crate) instanced: bool,
    pub(crate) is_indexed: bool,
    pub(crate) no_alloc: bool,
    pub(crate) update: Option<UpdateFn<C>>,
    pub(crate) value: Option<Rc<AttributeBuffer>>,
}

impl<C: ?Sized> AttributeDescriptor<C> {
    /// A float attribute with `size` components and no updater yet.
    pub fn new(size: usize) -> Self {
        Self {
            size,
            element_type: ElementType::Float32,
            instanced: false,
            is_indexed: false,
            no_alloc: false,
            update: None,
            value: None,
        }
    }

    #[must_use]
    pub fn element_type(mut self, element_type: ElementType) -> Self {
        self.element_type = element_type;
        self
    }

    /// Advance once per instance rather than per vertex.
    #[must_use]
    pub fn instanced(mut self, instanced: bool) -> Self {
        self.instanced = instanced;
        self
    }

    #[must_use]
    pub fn indexed(mut self, is_indexed: bool) -> Self {
        self.is_indexed = is_indexed;
        self
    }

    /// The buffer is supplied by some other path and never allocated here.
    #[must_use]
    pub fn no_alloc(mut self) -> Self {
        self.no_alloc = true;
        self
    }

    #[must_use]
    pub fn update(
        mut self,
        update: impl Fn(&mut AttributeBuffer, &UpdateArgs<'_, C>) + 'static,
    ) -> Self {
        self.update = Some(Rc::new(update));
        self
    }

    /// Initial contents.
    #[must_use]
    pub fn value(mut self, value: impl Into<AttributeBuffer>) -> Self {
        self.value = Some(Rc::new(value.into()));
        self
    }

    pub(crate) fn validate(&self, name: &str) -> Result<()> {
        if self.size == 0 {
            return Err(OverlayError::MissingAttributeSize(name.to_string()));
        }
        if self.update.is_none() && !self.no_alloc {
            return Err(OverlayError::MissingAttributeUpdate(name.to_string()));
        }
        Ok(())
    }
}

/// A registered attribute and its dirty-tracking state.
pub struct Attribute<C: ?Sized = dyn Layer> {
    pub(crate) size: usize,
    pub(crate) element_type: ElementType,
    pub(crate) instanced: bool,
    pub(crate) is_indexed: bool,
    pub(crate) update: Option<UpdateFn<C>>,
    pub(crate) value: Option<Rc<AttributeBuffer>>,
    pub(crate) is_external_buffer: bool,
    pub(crate) needs_alloc: bool,
    pub(crate) needs_update: bool,
    pub(crate) changed: bool,
}

impl<C: ?Sized> Attribute<C> {
    pub(crate) fn from_descriptor(descriptor: AttributeDescriptor<C>) -> Self {
        Self {
            size: descriptor.size,
            element_type: descriptor.element_type,
            instanced: descriptor.instanced,
            is_indexed: descriptor.is_indexed,
            update: descriptor.update,
            value: descriptor.value,
            is_external_buffer: false,
            needs_alloc: false,
            needs_update: false,
            changed: false,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn element_type(&self) -> ElementType {
        self.element_type
    }

    pub fn instanced(&self) -> bool {
        self.instanced
    }

    pub fn is_indexed(&self) -> bool {
        self.is_indexed
    }

    pub fn value(&self) -> Option<&AttributeBuffer> {
        self.value.as_deref()
    }

    /// Number of whole instances the current buffer can hold.
    pub fn capacity(&self) -> usize {
        self.value.as_ref().map_or(0, |v| v.len() / self.size)
    }

    pub fn is_external_buffer(&self) -> bool {
        self.is_external_buffer
    }

    pub fn needs_alloc(&self) -> bool {
        self.needs_alloc
    }

    pub fn needs_update(&self) -> bool {
        self.needs_update
    }

    /// Set when the buffer was recomputed or replaced and not yet consumed.
    pub fn changed(&self) -> bool {
        self.changed
    }
}

impl<C: ?Sized> fmt::Debug for Attribute<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attribute")
            .field("size", &self.size)
            .field("element_type", &self.element_type)
            .field("instanced", &self.instanced)
            .field("len", &self.value.as_ref().map(|v| v.len()))
            .field("is_external_buffer", &self.is_external_buffer)
            .field("needs_update", &self.needs_update)
            .field("changed", &self.changed)
            .finish_non_exhaustive()
    }
}

/// Snapshot of an attribute handed to the GPU binding layer.
///
/// The buffer is shared; holding a binding across an update makes the next
/// recompute write into a fresh copy.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeBinding {
    pub name: String,
    pub size: usize,
    pub element_type: ElementType,
    pub instanced: bool,
    pub is_indexed: bool,
    pub value: Option<Rc<AttributeBuffer>>,
}

impl AttributeBinding {
    pub(crate) fn new<C: ?Sized>(name: &str, attribute: &Attribute<C>) -> Self {
        Self {
            name: name.to_string(),
            size: attribute.size,
            element_type: attribute.element_type,
            instanced: attribute.instanced,
            is_indexed: attribute.is_indexed,
            value: attribute.value.clone(),
        }
    }
}
