//! Enum constants, written by ordinal or (with [crate::Config::enum_by_name]) by name.

use super::Serializer;
use crate::{
    buffer,
    context::{ReadContext, WriteContext},
    registry::TypeDef,
    varint, EnumValue, Error, TypeName, Value,
};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug)]
pub struct EnumSerializer {
    ty: Option<TypeName>,
    def: Option<Arc<TypeDef>>,
}

impl EnumSerializer {
    /// Serializer for a registered enum.
    pub fn known(def: Arc<TypeDef>) -> Self {
        Self {
            ty: Some(def.name().clone()),
            def: Some(def),
        }
    }

    /// Serializer for an enum the registry does not know. Every constant decodes to
    /// [EnumValue::Unknown].
    pub fn unknown(ty: Option<TypeName>) -> Self {
        Self { ty, def: None }
    }

    fn describe(&self) -> String {
        self.ty
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_else(|| "enum".into())
    }

    fn unknown_value(
        &self,
        ctx: &ReadContext<'_>,
        ordinal: Option<u32>,
        name: Option<String>,
    ) -> Result<Value, Error> {
        let variant = match (&name, ordinal) {
            (Some(name), _) => name.clone(),
            (None, Some(ordinal)) => ordinal.to_string(),
            (None, None) => String::new(),
        };
        if ctx.cfg.unknown_enum_as_error {
            return Err(Error::UnknownEnumVariant {
                ty: self.describe(),
                variant,
            });
        }
        debug!(ty = %self.describe(), %variant, "decoded unknown enum constant");
        Ok(Value::Enum(EnumValue::Unknown {
            ty: self.ty.clone(),
            ordinal,
            name,
        }))
    }
}

impl Serializer for EnumSerializer {
    fn write(&self, ctx: &mut WriteContext<'_>, value: &Value) -> Result<(), Error> {
        let Value::Enum(constant) = value else {
            return Err(Error::TypeMismatch {
                context: self.describe(),
                expected: "enum".into(),
            });
        };
        let by_name = ctx.cfg.enum_by_name;
        match constant {
            EnumValue::Known { ty, ordinal } => {
                let def = self.def.as_ref().filter(|def| def.name() == ty);
                let Some(def) = def else {
                    return Err(Error::TypeMismatch {
                        context: ty.to_string(),
                        expected: self.describe(),
                    });
                };
                let Some(name) = def.variants().get(*ordinal as usize) else {
                    return Err(Error::UnknownEnumVariant {
                        ty: ty.to_string(),
                        variant: ordinal.to_string(),
                    });
                };
                if by_name {
                    buffer::write_string(name, ctx.buf);
                } else {
                    varint::write(*ordinal, ctx.buf);
                }
            }

            // Forward whatever was decoded, if it fits the configured encoding.
            EnumValue::Unknown { ordinal, name, .. } => match (by_name, ordinal, name) {
                (true, _, Some(name)) => buffer::write_string(name, ctx.buf),
                (false, Some(ordinal), _) => varint::write(*ordinal, ctx.buf),
                _ => {
                    return Err(Error::Unsupported(format!(
                        "unknown constant of {} cannot be re-encoded",
                        self.describe()
                    )))
                }
            },
        }
        Ok(())
    }

    fn read(&self, ctx: &mut ReadContext<'_>) -> Result<Value, Error> {
        if ctx.cfg.enum_by_name {
            let name = buffer::read_string(ctx.buf, &ctx.cfg.max_string_len)?;
            if let Some(value) = self.def.as_ref().and_then(|def| def.constant(&name)) {
                return Ok(value);
            }
            return self.unknown_value(ctx, None, Some(name));
        }

        let ordinal: u32 = varint::read(ctx.buf)?;
        match &self.def {
            Some(def) if (ordinal as usize) < def.variants().len() => Ok(Value::Enum(
                EnumValue::known(def.name().clone(), ordinal),
            )),
            _ => self.unknown_value(ctx, Some(ordinal), None),
        }
    }
}
