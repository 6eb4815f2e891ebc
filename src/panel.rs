use anyhow::{anyhow, Result};

type Getter<T> = Box<dyn Fn() -> T + Send + Sync>;
type Setter<T> = Box<dyn Fn(T) + Send + Sync>;
type ChangeCallback = Box<dyn Fn() + Send + Sync>;

enum Control {
    Number {
        min: f32,
        max: f32,
        step: f32,
        get: Getter<f32>,
        set: Setter<f32>,
    },
    Choice {
        options: Vec<String>,
        get: Getter<String>,
        set: Setter<String>,
    },
    Toggle {
        get: Getter<bool>,
        set: Setter<bool>,
    },
}

/// One tunable field registered with the panel.
pub struct Binding {
    name: String,
    control: Control,
    on_change: Option<ChangeCallback>,
}

impl Binding {
    /// Registers a callback fired after every successful write.
    pub fn on_change(&mut self, callback: impl Fn() + Send + Sync + 'static) -> &mut Self {
        self.on_change = Some(Box::new(callback));
        self
    }
}

/// Registry of live-tunable fields.
///
/// A pure side channel: bindings read and write scene or renderer state
/// through closures, and nothing in the core loop depends on the panel.
#[derive(Default)]
pub struct Panel {
    bindings: Vec<Binding>,
}

impl Panel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a numeric field with a range and step.
    pub fn bind_number(
        &mut self,
        name: impl Into<String>,
        min: f32,
        max: f32,
        step: f32,
        get: impl Fn() -> f32 + Send + Sync + 'static,
        set: impl Fn(f32) + Send + Sync + 'static,
    ) -> &mut Binding {
        self.push(Binding {
            name: name.into(),
            control: Control::Number {
                min,
                max,
                step,
                get: Box::new(get),
                set: Box::new(set),
            },
            on_change: None,
        })
    }

    /// Binds an enumerated field; `set` receives the chosen option label.
    pub fn bind_choice(
        &mut self,
        name: impl Into<String>,
        options: Vec<String>,
        get: impl Fn() -> String + Send + Sync + 'static,
        set: impl Fn(String) + Send + Sync + 'static,
    ) -> &mut Binding {
        self.push(Binding {
            name: name.into(),
            control: Control::Choice {
                options,
                get: Box::new(get),
                set: Box::new(set),
            },
            on_change: None,
        })
    }

    /// Binds a boolean flag.
    pub fn bind_toggle(
        &mut self,
        name: impl Into<String>,
        get: impl Fn() -> bool + Send + Sync + 'static,
        set: impl Fn(bool) + Send + Sync + 'static,
    ) -> &mut Binding {
        self.push(Binding {
            name: name.into(),
            control: Control::Toggle {
                get: Box::new(get),
                set: Box::new(set),
            },
            on_change: None,
        })
    }

    fn push(&mut self, binding: Binding) -> &mut Binding {
        self.bindings.push(binding);
        let index = self.bindings.len() - 1;
        &mut self.bindings[index]
    }

    /// Writes a numeric field, clamping to its range and snapping to its
    /// step. Returns the value actually applied.
    pub fn set_number(&self, name: &str, value: f32) -> Result<f32> {
        let binding = self.find(name)?;
        match binding.control {
            Control::Number {
                min,
                max,
                step,
                ref set,
                ..
            } => {
                let mut applied = value.clamp(min, max);
                if step > 0.0 {
                    applied = (min + ((applied - min) / step).round() * step).clamp(min, max);
                }
                set(applied);
                binding.fire();
                Ok(applied)
            }
            _ => Err(anyhow!("{name} is not a numeric binding")),
        }
    }

    /// Selects an option of an enumerated field.
    pub fn set_choice(&self, name: &str, option: &str) -> Result<()> {
        let binding = self.find(name)?;
        match binding.control {
            Control::Choice {
                ref options,
                ref set,
                ..
            } => {
                if !options.iter().any(|candidate| candidate == option) {
                    return Err(anyhow!("{option:?} is not an option of {name}"));
                }
                set(option.to_string());
                binding.fire();
                Ok(())
            }
            _ => Err(anyhow!("{name} is not a choice binding")),
        }
    }

    /// Writes a boolean flag.
    pub fn set_toggle(&self, name: &str, value: bool) -> Result<()> {
        let binding = self.find(name)?;
        match binding.control {
            Control::Toggle { ref set, .. } => {
                set(value);
                binding.fire();
                Ok(())
            }
            _ => Err(anyhow!("{name} is not a toggle binding")),
        }
    }

    /// Current value of a binding, formatted for display.
    pub fn value(&self, name: &str) -> Result<String> {
        let binding = self.find(name)?;
        Ok(match binding.control {
            Control::Number { ref get, .. } => format!("{:.3}", get()),
            Control::Choice { ref get, .. } => get(),
            Control::Toggle { ref get, .. } => get().to_string(),
        })
    }

    pub fn names(&self) -> Vec<&str> {
        self.bindings.iter().map(|b| b.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    fn find(&self, name: &str) -> Result<&Binding> {
        self.bindings
            .iter()
            .find(|binding| binding.name == name)
            .ok_or_else(|| anyhow!("no binding named {name}"))
    }
}

impl Binding {
    fn fire(&self) {
        if let Some(callback) = &self.on_change {
            callback();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::RwLock;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn number_panel(store: Arc<RwLock<f32>>) -> Panel {
        let mut panel = Panel::new();
        let read = Arc::clone(&store);
        panel.bind_number(
            "Exposure",
            0.0,
            10.0,
            0.001,
            move || *read.read(),
            move |v| *store.write() = v,
        );
        panel
    }

    #[test]
    fn numbers_clamp_to_their_range() {
        let store = Arc::new(RwLock::new(3.0));
        let panel = number_panel(Arc::clone(&store));
        assert_eq!(panel.set_number("Exposure", 42.0).unwrap(), 10.0);
        assert_eq!(*store.read(), 10.0);
        assert_eq!(panel.set_number("Exposure", -1.0).unwrap(), 0.0);
    }

    #[test]
    fn numbers_snap_to_their_step() {
        let store = Arc::new(RwLock::new(0.0));
        let panel = number_panel(Arc::clone(&store));
        let applied = panel.set_number("Exposure", 1.23456).unwrap();
        assert!((applied - 1.235).abs() < 1e-5);
    }

    #[test]
    fn choices_reject_unknown_options() {
        let mut panel = Panel::new();
        let current = Arc::new(RwLock::new("Reinhard".to_string()));
        let read = Arc::clone(&current);
        let write = Arc::clone(&current);
        panel.bind_choice(
            "Tone Mapping",
            vec!["None".into(), "Reinhard".into()],
            move || read.read().clone(),
            move |v| *write.write() = v,
        );
        assert!(panel.set_choice("Tone Mapping", "Bogus").is_err());
        panel.set_choice("Tone Mapping", "None").unwrap();
        assert_eq!(panel.value("Tone Mapping").unwrap(), "None");
    }

    #[test]
    fn change_callback_fires_on_every_write() {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let store = Arc::new(RwLock::new(0.0));
        let mut panel = number_panel(store);
        // Rebind is not supported; attach the callback at registration time.
        let read = Arc::new(RwLock::new(true));
        let write = Arc::clone(&read);
        panel
            .bind_toggle(
                "Antialias",
                move || *read.read(),
                move |v| *write.write() = v,
            )
            .on_change(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        panel.set_toggle("Antialias", false).unwrap();
        panel.set_toggle("Antialias", true).unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unknown_bindings_and_kind_mismatches_are_errors() {
        let panel = number_panel(Arc::new(RwLock::new(0.0)));
        assert!(panel.set_number("Missing", 1.0).is_err());
        assert!(panel.set_toggle("Exposure", true).is_err());
        assert!(panel.set_choice("Exposure", "None").is_err());
    }
}
