//! Named operation registry and ordered pipeline execution.
//!
//! The registry owns one instance of every [`Operation`] the server knows
//! about. Registration order matters: it is the base order in which queued
//! steps run when their priorities tie.

use image::DynamicImage;
use std::time::Instant;

use super::adjust::{Blur, Brightness, Gamma, Saturation, Size};
use super::glitch::{ChromaticAberration, ChromaticSmear, ColorCruncher};
use super::operation::{ImagingError, Operation};

/// One queued transformation: which operation, its raw argument, and its
/// ordering priority (higher runs first).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub name: String,
    pub args: String,
    pub priority: i64,
}

impl Step {
    pub fn new(name: impl Into<String>, args: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: args.into(),
            priority: 0,
        }
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }
}

pub struct Registry {
    ops: Vec<Box<dyn Operation>>,
}

impl Registry {
    /// A registry with no operations.
    pub fn empty() -> Self {
        Self { ops: Vec::new() }
    }

    /// Every built-in operation, in default execution order.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry
            .register(Size)
            .register(Saturation)
            .register(Gamma)
            .register(Brightness)
            .register(Blur)
            .register(ChromaticSmear)
            .register(ColorCruncher)
            .register(ChromaticAberration);
        registry
    }

    /// Add an operation. A later registration under an existing name replaces
    /// the earlier one in place, keeping its position.
    pub fn register(&mut self, op: impl Operation + 'static) -> &mut Self {
        let op: Box<dyn Operation> = Box::new(op);
        match self.position(op.name()) {
            Some(i) => self.ops[i] = op,
            None => self.ops.push(op),
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&dyn Operation> {
        self.ops
            .iter()
            .find(|op| op.name() == name)
            .map(|op| op.as_ref())
    }

    /// Registration index of `name`, if known.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.ops.iter().position(|op| op.name() == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.ops.iter().map(|op| op.name())
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Run `steps` in the order given, feeding each output into the next.
    ///
    /// The first failing step aborts the run.
    pub fn apply(&self, steps: &[Step], image: DynamicImage) -> Result<DynamicImage, ImagingError> {
        steps.iter().try_fold(image, |image, step| {
            let op = self.get(&step.name).ok_or_else(|| {
                ImagingError::Unsupported(format!("unknown operation `{}`", step.name))
            })?;
            let start = Instant::now();
            let out = op.apply(&step.args, image)?;
            tracing::debug!(
                op = %step.name,
                args = %step.args,
                width = out.width(),
                height = out.height(),
                elapsed_ms = start.elapsed().as_millis() as u64,
                "applied operation"
            );
            Ok(out)
        })
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use std::sync::Mutex;

    /// Operation that records its invocations and returns the input unchanged.
    #[derive(Default)]
    pub struct RecordingOp {
        pub name: &'static str,
        pub calls: Mutex<Vec<String>>,
    }

    impl RecordingOp {
        pub fn new(name: &'static str) -> Self {
            Self {
                name,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    impl Operation for RecordingOp {
        fn name(&self) -> &'static str {
            self.name
        }

        fn apply(&self, args: &str, image: DynamicImage) -> Result<DynamicImage, ImagingError> {
            self.calls.lock().unwrap().push(args.to_string());
            Ok(image)
        }
    }

    /// Appends its argument to a shared log and fails on `"fail"`.
    struct Tagger {
        name: &'static str,
        log: std::sync::Arc<Mutex<Vec<&'static str>>>,
    }

    impl Operation for Tagger {
        fn name(&self) -> &'static str {
            self.name
        }

        fn apply(&self, args: &str, image: DynamicImage) -> Result<DynamicImage, ImagingError> {
            if args == "fail" {
                return Err(ImagingError::invalid(self.name, "asked to fail"));
            }
            self.log.lock().unwrap().push(self.name);
            Ok(image)
        }
    }

    fn tiny() -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, Rgb([1, 2, 3])))
    }

    #[test]
    fn defaults_are_registered_in_order() {
        let names: Vec<_> = Registry::with_defaults().names().collect();
        assert_eq!(
            names,
            vec![
                "size",
                "sat",
                "gamma",
                "brightness",
                "blur",
                "chromaticSmear",
                "colorCruncher",
                "chromaticAberration"
            ]
        );
    }

    #[test]
    fn register_replaces_in_place() {
        let mut registry = Registry::with_defaults();
        let before = registry.len();
        registry.register(RecordingOp::new("gamma"));
        assert_eq!(registry.len(), before);
        assert_eq!(registry.position("gamma"), Some(2));

        registry.apply(&[Step::new("gamma", "2")], tiny()).unwrap();
    }

    #[test]
    fn apply_runs_steps_in_given_order() {
        let log = std::sync::Arc::new(Mutex::new(Vec::new()));
        let mut registry = Registry::empty();
        for name in ["a", "b", "c"] {
            registry.register(Tagger {
                name,
                log: log.clone(),
            });
        }
        let steps = [Step::new("c", ""), Step::new("a", ""), Step::new("b", "")];
        registry.apply(&steps, tiny()).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["c", "a", "b"]);
    }

    #[test]
    fn apply_stops_at_first_failure() {
        let log = std::sync::Arc::new(Mutex::new(Vec::new()));
        let mut registry = Registry::empty();
        for name in ["a", "b"] {
            registry.register(Tagger {
                name,
                log: log.clone(),
            });
        }
        let err = registry
            .apply(&[Step::new("a", "fail"), Step::new("b", "")], tiny())
            .unwrap_err();
        assert!(matches!(err, ImagingError::InvalidArgument { op: "a", .. }));
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn apply_unknown_operation_is_unsupported() {
        let err = Registry::empty()
            .apply(&[Step::new("sharpen", "1")], tiny())
            .unwrap_err();
        assert!(matches!(err, ImagingError::Unsupported(_)));
    }

    #[test]
    fn no_steps_returns_input() {
        let out = Registry::with_defaults().apply(&[], tiny()).unwrap();
        assert_eq!((out.width(), out.height()), (4, 4));
    }
}
