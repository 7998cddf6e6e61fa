//! # Builders
//!
//! Every object of strata is created in two phases. A builder accumulates properties, each of which can be set
//! exactly once. Its terminal [finish](Builder::finish) consumes the builder, checks that all required properties are
//! present and consistent, and only then hands the validated state to the device's backend.
//!
//! Backend code therefore never sees an object in a partially specified state and does not need to validate again.

use std::{fmt::Display, marker::PhantomData};

use crate::{error::Result, UsageError, ValidationError};

///Kind of object a builder produces. Used to attribute errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Buffer,
    BufferView,
    Texture,
    TextureView,
    Sampler,
    BindGroupLayout,
    BindGroup,
    PipelineLayout,
}

impl Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ObjectKind::Buffer => "Buffer",
            ObjectKind::BufferView => "BufferView",
            ObjectKind::Texture => "Texture",
            ObjectKind::TextureView => "TextureView",
            ObjectKind::Sampler => "Sampler",
            ObjectKind::BindGroupLayout => "BindGroupLayout",
            ObjectKind::BindGroup => "BindGroup",
            ObjectKind::PipelineLayout => "PipelineLayout",
        };
        f.write_str(name)
    }
}

///A named, settable property of some builder. Each property owns one bit of the builder's [PropertySet].
pub trait Property: Copy {
    const OBJECT: ObjectKind;
    fn bit(self) -> u32;
    fn name(self) -> &'static str;
}

///Bitmask of properties that have been set on a builder.
#[derive(Debug)]
pub struct PropertySet<P: Property> {
    set: u32,
    ty: PhantomData<P>,
}

impl<P: Property> Default for PropertySet<P> {
    fn default() -> Self {
        PropertySet {
            set: 0,
            ty: PhantomData,
        }
    }
}

impl<P: Property> PropertySet<P> {
    pub fn is_set(&self, property: P) -> bool {
        self.set & property.bit() != 0
    }

    ///Fails if `property` was already marked. Leaves the set unchanged in that case.
    pub fn check_unset(&self, property: P) -> Result<()> {
        if self.is_set(property) {
            #[cfg(feature = "logging")]
            log::warn!("{} property {} set multiple times", P::OBJECT, property.name());
            return Err(UsageError::DuplicateProperty {
                object: P::OBJECT,
                property: property.name(),
            }
            .into());
        }
        Ok(())
    }

    ///Marks `property` as set. Fails if it was already marked.
    pub fn mark(&mut self, property: P) -> Result<()> {
        self.check_unset(property)?;
        self.set |= property.bit();
        Ok(())
    }

    ///Checks that every property in `required` has been set.
    pub fn require(&self, required: &[P]) -> Result<()> {
        let missing = required
            .iter()
            .filter(|p| !self.is_set(**p))
            .map(|p| p.name())
            .collect::<Vec<_>>();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::IncompleteConfiguration {
                object: P::OBJECT,
                reason: format!("missing properties: {}", missing.join(", ")),
            }
            .into())
        }
    }
}

///Terminal operation shared by all builders.
pub trait Builder: Sized {
    type Product;
    ///Validates the accumulated state and creates the object. Consumes the builder, regardless of the outcome.
    fn finish(self) -> Result<Self::Product>;
}
