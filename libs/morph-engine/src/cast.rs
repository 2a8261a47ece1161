use std::fmt;
use std::sync::Arc;

use morph_api::error::{ConvertError, ConvertResult};
use morph_api::metamorphosis::Metamorphosis;
use morph_api::schema::Shape;
use morph_api::value::Value;

use crate::context::Context;
use crate::settings::{Configuration, SettingDecl, SettingKind, SettingValue, Strategy};

/// Behaviour shared by every cast of one kind.
///
/// A kind is stateless: everything that varies between two casts of the same
/// kind lives in their [`Configuration`].
pub trait CastKind: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Settings declared by this kind, on top of [`base_defaults`].
    fn defaults(&self) -> ConvertResult<Configuration> {
        Ok(Configuration::new())
    }

    fn call(&self, cast: &Cast, value: &Value, cx: &mut Context) -> ConvertResult<Value>;
}

/// Settings every cast carries.
///
/// - `mm_to_cast`: local registrations, valid for the cast's whole subtree
/// - `logs`: emit per-step debug events
/// - `strip_none`: drop `Null` items before converting them
/// - `strict_schemas`: refuse to improvise schemas
///
/// The last three flow down from the conversion's root settings and replace
/// whatever a prototype holds, so they are chosen per conversion
/// (`Engine::convert_with`), not per registered cast.
pub fn base_defaults() -> ConvertResult<Configuration> {
    Configuration::new()
        .with_setting(
            SettingDecl::new("mm_to_cast", SettingValue::Map(Vec::new()))
                .expect(SettingKind::Map)
                .on_override(Strategy::MergeShallow)
                .on_customize(Strategy::MergeShallow),
        )?
        .with_setting(SettingDecl::new("logs", true).expect(SettingKind::Bool))?
        .with_setting(SettingDecl::new("strip_none", false).expect(SettingKind::Bool))?
        .with_setting(SettingDecl::new("strict_schemas", false).expect(SettingKind::Bool))
}

/// Registered, unresolved converter: a kind plus its static configuration.
#[derive(Clone)]
pub struct CastProto {
    kind: Arc<dyn CastKind>,
    settings: Configuration,
}

impl CastProto {
    pub fn new(kind: impl CastKind + 'static) -> ConvertResult<Self> {
        Self::from_arc(Arc::new(kind))
    }

    pub fn from_arc(kind: Arc<dyn CastKind>) -> ConvertResult<Self> {
        Self::inheriting(kind, &[], &Configuration::new())
    }

    /// Prototype whose configuration composes, from least to most significant:
    /// the base settings, the kind's defaults, `parents` (listed most
    /// significant first) and finally `own`.
    pub fn inheriting(
        kind: Arc<dyn CastKind>,
        parents: &[&CastProto],
        own: &Configuration,
    ) -> ConvertResult<Self> {
        let base = base_defaults()?;
        let kind_defaults = kind.defaults()?;
        let mut lineage: Vec<&Configuration> = parents.iter().map(|p| &p.settings).collect();
        lineage.push(&kind_defaults);
        lineage.push(&base);
        let settings = Configuration::inherit(&lineage, own)?;
        Ok(Self { kind, settings })
    }

    /// Override one declared setting.
    pub fn with(mut self, name: &str, value: impl Into<SettingValue>) -> ConvertResult<Self> {
        self.settings.override_values([(name, value.into())])?;
        Ok(self)
    }

    pub fn name(&self) -> &str {
        self.kind.name()
    }

    pub fn settings(&self) -> &Configuration {
        &self.settings
    }

    /// Resolved cast one level below `parent_depth`, configured by `parent`.
    pub fn instantiate(
        &self,
        parent: &Configuration,
        mm: Metamorphosis,
        from: Shape,
        to: Shape,
        parent_depth: usize,
    ) -> ConvertResult<Cast> {
        let mut settings = self.settings.clone();
        settings.customize(parent)?;
        Ok(Cast {
            kind: Arc::clone(&self.kind),
            settings,
            mm,
            from,
            to,
            depth: parent_depth + 1,
        })
    }
}

impl fmt::Debug for CastProto {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CastProto")
            .field("kind", &self.kind.name())
            .field("settings", &self.settings.names().collect::<Vec<_>>())
            .finish()
    }
}

/// Resolved converter, used for one value of one conversion tree.
#[derive(Clone)]
pub struct Cast {
    kind: Arc<dyn CastKind>,
    pub settings: Configuration,
    /// Metamorphosis this cast was resolved for.
    pub mm: Metamorphosis,
    pub from: Shape,
    pub to: Shape,
    pub depth: usize,
}

impl Cast {
    pub fn name(&self) -> &str {
        self.kind.name()
    }

    /// `logs` setting; missing reads as enabled.
    pub fn logs(&self) -> bool {
        self.settings.get_bool("logs").unwrap_or(true)
    }

    pub fn call(&self, value: &Value, cx: &mut Context) -> ConvertResult<Value> {
        if self.depth > cx.max_depth() {
            return Err(ConvertError::depth_exceeded(cx.max_depth()).with_metamorphosis(&self.mm));
        }
        if self.logs() {
            tracing::debug!(cast = self.name(), mm = %self.mm, depth = self.depth, "calling cast");
        }
        self.kind
            .call(self, value, cx)
            .map_err(|e| e.with_metamorphosis(&self.mm))
    }
}

impl fmt::Debug for Cast {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cast")
            .field("kind", &self.kind.name())
            .field("mm", &self.mm)
            .field("from", &self.from)
            .field("to", &self.to)
            .field("depth", &self.depth)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use morph_api::types::TypeSet;

    use super::*;
    use crate::casts::FnCast;

    fn upper() -> CastProto {
        CastProto::new(FnCast::new("upper", |value, _| {
            Ok(Value::from(value.as_str().unwrap_or_default().to_uppercase()))
        }))
        .expect("proto")
    }

    #[test]
    fn prototypes_carry_base_settings() {
        let proto = upper();
        for name in ["mm_to_cast", "logs", "strip_none", "strict_schemas"] {
            assert!(proto.settings().contains(name), "{name}");
        }
        assert!(matches!(
            proto.clone().with("unknown", true).unwrap_err().kind(),
            morph_api::error::ErrorKind::UnknownSetting(_)
        ));
    }

    #[test]
    fn instantiate_customizes_and_descends() {
        let mut parent = base_defaults().expect("defaults");
        parent.set("strip_none", true).expect("set");
        let cast = upper()
            .instantiate(&parent, Metamorphosis::default(), Shape::Any, Shape::Any, 3)
            .expect("cast");
        assert_eq!(cast.depth, 4);
        assert!(cast.settings.get_bool("strip_none").expect("strip_none"));
    }

    #[test]
    fn depth_ceiling_is_enforced() {
        let mut cx = Context::detached(2);
        let mm = Metamorphosis::new(TypeSet::exact("str"), TypeSet::Any);
        let parent = base_defaults().expect("defaults");
        let shallow = upper().instantiate(&parent, mm.clone(), Shape::Any, Shape::Any, 1).expect("cast");
        assert_eq!(shallow.call(&Value::from("a"), &mut cx).ok(), Some(Value::from("A")));

        let deep = upper().instantiate(&parent, mm.clone(), Shape::Any, Shape::Any, 2).expect("cast");
        let err = deep.call(&Value::from("a"), &mut cx).unwrap_err();
        assert!(matches!(err.kind(), morph_api::error::ErrorKind::DepthExceeded(2)));
        assert_eq!(err.metamorphosis(), Some(&mm));
    }
}
