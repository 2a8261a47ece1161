//! Picks the prototype for a requested metamorphosis and turns it into a cast.

use morph_api::error::{ConvertError, ConvertResult};
use morph_api::metamorphosis::Metamorphosis;
use morph_api::schema::Shape;
use morph_api::value::Key;

use crate::cast::{Cast, CastProto};
use crate::context::Context;
use crate::settings::{Configuration, SettingKey, SettingValue};

/// Local registrations from the `mm_to_cast` setting.
fn local_casts(settings: &Configuration) -> ConvertResult<Vec<(&Metamorphosis, &CastProto)>> {
    settings
        .get_map("mm_to_cast")?
        .iter()
        .map(|(key, value)| match (key, value) {
            (SettingKey::Mm(mm), SettingValue::Cast(proto)) => Ok((mm, proto)),
            _ => Err(ConvertError::setting_type("mm_to_cast", "metamorphosis -> cast", "other entry")),
        })
        .collect()
}

/// Resolve `request` against the registry plus the local registrations of
/// `parent`, then instantiate the winner one level below `parent_depth`.
///
/// A local registration shadows a global one for the same metamorphosis.
pub fn resolve(
    cx: &mut Context,
    parent: &Configuration,
    request: &Metamorphosis,
    from: Shape,
    to: Shape,
    parent_depth: usize,
) -> ConvertResult<Cast> {
    let local = local_casts(parent)?;
    let memo_key = (request.clone(), local.iter().map(|(mm, _)| (*mm).clone()).collect::<Vec<_>>());

    let chosen = match cx.memoized(&memo_key) {
        Some(chosen) => chosen.clone(),
        None => {
            let snapshot = cx.snapshot();
            let shadowed = |mm: &Metamorphosis| local.iter().any(|(own, _)| *own == mm);
            let candidates = local
                .iter()
                .map(|(mm, _)| *mm)
                .chain(snapshot.casts().iter().map(|(mm, _)| mm).filter(|mm| !shadowed(mm)));
            let chosen = request.pick_closest(candidates, snapshot.types())?.clone();
            cx.memoize(memo_key, chosen.clone());
            chosen
        }
    };

    let proto = local
        .iter()
        .find(|(mm, _)| **mm == chosen)
        .map(|(_, proto)| *proto)
        .or_else(|| cx.snapshot().cast(&chosen))
        .ok_or_else(|| ConvertError::no_converter(request.clone()))?;

    if parent.get_bool("logs").unwrap_or(true) {
        tracing::debug!(request = %request, chosen = %chosen, cast = proto.name(), "resolved cast");
    }
    proto.instantiate(parent, request.clone(), from, to, parent_depth)
}

/// Cast for one item of `parent`'s input.
///
/// Priority: the `key_to_cast` entry for `key`, then the blanket
/// `value_cast`, then registry resolution.
pub fn resolve_item(
    cx: &mut Context,
    parent: &Cast,
    key: &Key,
    request: &Metamorphosis,
    from: Shape,
    to: Shape,
) -> ConvertResult<Cast> {
    let settings = &parent.settings;

    if settings.contains("key_to_cast") {
        let per_key = settings.get_map("key_to_cast")?.iter().find_map(|(k, v)| match (k, v) {
            (SettingKey::Key(own), SettingValue::Cast(proto)) if own == key => Some(proto),
            _ => None,
        });
        if let Some(proto) = per_key {
            return proto.instantiate(settings, request.clone(), from, to, parent.depth);
        }
    }

    if settings.contains("value_cast") {
        if let Some(proto) = settings.get_cast("value_cast")? {
            return proto.instantiate(settings, request.clone(), from, to, parent.depth);
        }
    }

    resolve(cx, settings, request, from, to, parent.depth)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use morph_api::error::ErrorKind;
    use morph_api::types::{builtin, TypeSet};

    use super::*;
    use crate::cast::base_defaults;
    use crate::casts::FnCast;
    use crate::registry::Registry;

    fn proto(name: &'static str) -> CastProto {
        CastProto::new(FnCast::new(name, |v, _| Ok(v.clone()))).expect("proto")
    }

    fn int_to_any() -> Metamorphosis {
        Metamorphosis::new(TypeSet::exact(builtin::INT), TypeSet::Any)
    }

    fn registry() -> Registry {
        let registry = Registry::new();
        registry.register(Metamorphosis::default(), proto("anything"));
        registry.register(int_to_any(), proto("ints"));
        registry
    }

    #[test]
    fn most_specific_global_wins() {
        let mut cx = Context::new(registry().snapshot(), 16, usize::MAX);
        let parent = base_defaults().expect("defaults");
        let cast = resolve(&mut cx, &parent, &int_to_any(), Shape::Any, Shape::Any, 0).expect("resolved");
        assert_eq!(cast.name(), "ints");
        assert_eq!(cast.depth, 1);

        let request = Metamorphosis::new(TypeSet::exact(builtin::STR), TypeSet::Any);
        let cast = resolve(&mut cx, &parent, &request, Shape::Any, Shape::Any, 0).expect("resolved");
        assert_eq!(cast.name(), "anything");
    }

    #[test]
    fn local_registration_shadows_global() {
        let mut cx = Context::new(registry().snapshot(), 16, usize::MAX);
        let mut parent = base_defaults().expect("defaults");
        parent
            .set("mm_to_cast", SettingValue::map([(int_to_any(), proto("local ints"))]))
            .expect("set");
        let cast = resolve(&mut cx, &parent, &int_to_any(), Shape::Any, Shape::Any, 0).expect("resolved");
        assert_eq!(cast.name(), "local ints");
        // Children inherit the local table.
        assert_eq!(local_casts(&cast.settings).expect("local").len(), 1);
    }

    #[test]
    fn unresolved_request_names_the_metamorphosis() {
        let mut cx = Context::new(Arc::new(Default::default()), 16, usize::MAX);
        let parent = base_defaults().expect("defaults");
        let err = resolve(&mut cx, &parent, &int_to_any(), Shape::Any, Shape::Any, 0).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::NoConverterFound(int_to_any()));
    }
}
