// params.rs
// Named live controls over fields of a target object. Every write goes
// through the bound setter; the optional change hook runs before `set`
// returns.

use std::ops::RangeInclusive;

use glam::Vec3;

use crate::error::BindingError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamValue {
    Scalar(f32),
    Vec3(Vec3),
}

impl ParamValue {
    fn kind(&self) -> &'static str {
        match self {
            ParamValue::Scalar(_) => "scalar",
            ParamValue::Vec3(_) => "vec3",
        }
    }
}

impl std::fmt::Display for ParamValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParamValue::Scalar(v) => write!(f, "{:.3}", v),
            ParamValue::Vec3(v) => write!(f, "({:.3}, {:.3}, {:.3})", v.x, v.y, v.z),
        }
    }
}

type Getter<T> = Box<dyn Fn(&T) -> ParamValue>;
type Setter<T> = Box<dyn Fn(&mut T, ParamValue)>;
type ChangeHook<T> = Box<dyn Fn(&mut T)>;

pub struct Binding<T> {
    name: String,
    target: String,
    min: f32,
    max: f32,
    step: f32,
    get: Getter<T>,
    set: Setter<T>,
    on_change: Option<ChangeHook<T>>,
}

impl<T> Binding<T> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `object.field` key this binding writes.
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn range(&self) -> RangeInclusive<f32> {
        self.min..=self.max
    }

    pub fn step(&self) -> f32 {
        self.step
    }

    fn clamp(&self, value: ParamValue) -> ParamValue {
        match value {
            ParamValue::Scalar(v) => ParamValue::Scalar(v.clamp(self.min, self.max)),
            ParamValue::Vec3(v) => {
                ParamValue::Vec3(v.clamp(Vec3::splat(self.min), Vec3::splat(self.max)))
            }
        }
    }
}

/// Handle returned by `bind_*` for attaching a change hook.
pub struct BindingRef<'r, T> {
    binding: &'r mut Binding<T>,
}

impl<'r, T> BindingRef<'r, T> {
    pub fn on_change(self, hook: impl Fn(&mut T) + 'static) -> Self {
        self.binding.on_change = Some(Box::new(hook));
        self
    }
}

pub struct ParameterRegistry<T> {
    bindings: Vec<Binding<T>>,
}

impl<T: 'static> ParameterRegistry<T> {
    pub fn new() -> Self {
        Self {
            bindings: Vec::new(),
        }
    }

    pub fn bind_scalar(
        &mut self,
        name: &str,
        target: &str,
        range: RangeInclusive<f32>,
        step: f32,
        get: impl Fn(&T) -> f32 + 'static,
        set: impl Fn(&mut T, f32) + 'static,
    ) -> Result<BindingRef<'_, T>, BindingError> {
        self.bind(
            name,
            target,
            range,
            step,
            Box::new(move |t: &T| ParamValue::Scalar(get(t))),
            Box::new(move |t: &mut T, value: ParamValue| {
                if let ParamValue::Scalar(v) = value {
                    set(t, v)
                }
            }),
        )
    }

    pub fn bind_vec3(
        &mut self,
        name: &str,
        target: &str,
        range: RangeInclusive<f32>,
        step: f32,
        get: impl Fn(&T) -> Vec3 + 'static,
        set: impl Fn(&mut T, Vec3) + 'static,
    ) -> Result<BindingRef<'_, T>, BindingError> {
        self.bind(
            name,
            target,
            range,
            step,
            Box::new(move |t: &T| ParamValue::Vec3(get(t))),
            Box::new(move |t: &mut T, value: ParamValue| {
                if let ParamValue::Vec3(v) = value {
                    set(t, v)
                }
            }),
        )
    }

    fn bind(
        &mut self,
        name: &str,
        target: &str,
        range: RangeInclusive<f32>,
        step: f32,
        get: Getter<T>,
        set: Setter<T>,
    ) -> Result<BindingRef<'_, T>, BindingError> {
        if self.position(name).is_some() {
            return Err(BindingError::DuplicateName(name.to_string()));
        }
        if let Some(existing) = self.bindings.iter().find(|b| b.target == target) {
            return Err(BindingError::DuplicateTarget {
                target: target.to_string(),
                existing: existing.name.clone(),
            });
        }

        let (min, max) = (*range.start(), *range.end());
        self.bindings.push(Binding {
            name: name.to_string(),
            target: target.to_string(),
            min: min.min(max),
            max: max.max(min),
            step: step.abs(),
            get,
            set,
            on_change: None,
        });
        let index = self.bindings.len() - 1;
        Ok(BindingRef {
            binding: &mut self.bindings[index],
        })
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.bindings.iter().position(|b| b.name == name)
    }

    fn binding(&self, name: &str) -> Result<&Binding<T>, BindingError> {
        self.bindings
            .iter()
            .find(|b| b.name == name)
            .ok_or_else(|| BindingError::UnknownBinding(name.to_string()))
    }

    pub fn get(&self, name: &str, target: &T) -> Result<ParamValue, BindingError> {
        Ok((self.binding(name)?.get)(target))
    }

    /// Clamps `value` into range, writes it and runs the change hook.
    /// Returns the value actually written.
    pub fn set(&self, name: &str, value: ParamValue, target: &mut T) -> Result<ParamValue, BindingError> {
        let binding = self.binding(name)?;
        let current = (binding.get)(target);
        if current.kind() != value.kind() {
            return Err(BindingError::KindMismatch {
                name: name.to_string(),
                expected: current.kind(),
            });
        }

        let value = binding.clamp(value);
        (binding.set)(target, value);
        log::info!("{} = {}", name, value);
        if let Some(hook) = &binding.on_change {
            hook(target);
        }
        Ok(value)
    }

    /// Moves a binding by `steps` increments of its step size.
    pub fn nudge(&self, name: &str, steps: f32, target: &mut T) -> Result<ParamValue, BindingError> {
        let binding = self.binding(name)?;
        let delta = binding.step * steps;
        let next = match (binding.get)(target) {
            ParamValue::Scalar(v) => ParamValue::Scalar(v + delta),
            ParamValue::Vec3(v) => ParamValue::Vec3(v + Vec3::splat(delta)),
        };
        self.set(name, next, target)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.bindings.iter().map(|b| b.name.as_str())
    }

    pub fn bindings(&self) -> &[Binding<T>] {
        &self.bindings
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// One line per binding with its current value, for the control panel.
    pub fn describe(&self, target: &T) -> Vec<String> {
        self.bindings
            .iter()
            .map(|b| {
                format!(
                    "{:<16} {:>10}  [{} .. {}] step {}",
                    b.name,
                    (b.get)(target).to_string(),
                    b.min,
                    b.max,
                    b.step
                )
            })
            .collect()
    }
}

impl<T: 'static> Default for ParameterRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Target {
        intensity: f32,
        position: Vec3,
        changes: usize,
    }

    fn registry() -> ParameterRegistry<Target> {
        let mut registry = ParameterRegistry::<Target>::new();
        registry
            .bind_scalar("intensity", "light.intensity", 0.0..=10.0, 0.5, |t| t.intensity, |t, v| t.intensity = v)
            .unwrap()
            .on_change(|t| t.changes += 1);
        registry
            .bind_vec3("position", "light.position", -5.0..=5.0, 0.001, |t| t.position, |t, v| t.position = v)
            .unwrap();
        registry
    }

    #[test]
    fn set_writes_clamps_and_runs_hook_synchronously() {
        let registry = registry();
        let mut target = Target::default();

        let written = registry.set("intensity", ParamValue::Scalar(4.0), &mut target).unwrap();
        assert_eq!(written, ParamValue::Scalar(4.0));
        assert_eq!(target.intensity, 4.0);
        assert_eq!(target.changes, 1);

        registry.set("intensity", ParamValue::Scalar(50.0), &mut target).unwrap();
        assert_eq!(target.intensity, 10.0);
        assert_eq!(target.changes, 2);

        registry
            .set("position", ParamValue::Vec3(Vec3::new(9.0, -1.0, -9.0)), &mut target)
            .unwrap();
        assert_eq!(target.position, Vec3::new(5.0, -1.0, -5.0));
        assert_eq!(target.changes, 2);
    }

    #[test]
    fn duplicate_names_and_targets_are_rejected() {
        let mut registry = registry();
        assert_eq!(
            registry
                .bind_scalar("intensity", "other.field", 0.0..=1.0, 0.1, |_| 0.0, |_, _| {})
                .err(),
            Some(BindingError::DuplicateName("intensity".into()))
        );
        assert_eq!(
            registry
                .bind_scalar("brightness", "light.intensity", 0.0..=1.0, 0.1, |_| 0.0, |_, _| {})
                .err(),
            Some(BindingError::DuplicateTarget {
                target: "light.intensity".into(),
                existing: "intensity".into(),
            })
        );
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn unknown_names_and_wrong_kinds_fail() {
        let registry = registry();
        let mut target = Target::default();
        assert!(matches!(
            registry.set("missing", ParamValue::Scalar(1.0), &mut target),
            Err(BindingError::UnknownBinding(_))
        ));
        assert!(matches!(
            registry.set("intensity", ParamValue::Vec3(Vec3::ONE), &mut target),
            Err(BindingError::KindMismatch { expected: "scalar", .. })
        ));
        assert_eq!(target.changes, 0);
    }

    #[test]
    fn nudge_moves_by_step() {
        let registry = registry();
        let mut target = Target::default();
        registry.nudge("intensity", 3.0, &mut target).unwrap();
        assert_eq!(target.intensity, 1.5);
        registry.nudge("intensity", -10.0, &mut target).unwrap();
        assert_eq!(target.intensity, 0.0);
        assert_eq!(registry.describe(&target).len(), 2);
    }
}
