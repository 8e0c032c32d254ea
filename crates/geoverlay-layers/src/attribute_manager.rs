//! Attribute allocation and dirty tracking.
//!
//! Each attribute moves through `unallocated -> needs_alloc -> needs_update
//! -> clean`, and re-enters `needs_update` when invalidated or when the
//! instance count outgrows its buffer. [`AttributeManager::update`] does
//! nothing (no callbacks, no logging) when every attribute is clean.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::rc::Rc;

use geoverlay_core::{Logger, OverlayError, Result};

use crate::attribute::{
    Attribute, AttributeBinding, AttributeBuffer, AttributeDescriptor, UpdateArgs,
};
use crate::layer::Layer;

/// Externally managed buffers, keyed by attribute name.
pub type BufferMap = HashMap<String, Rc<AttributeBuffer>>;

/// Hook invoked with the manager id around a recompute pass.
pub type UpdateHook = Box<dyn Fn(&str)>;

/// Inputs to one [`AttributeManager::update`] pass.
pub struct AttributeUpdate<'a, C: ?Sized> {
    pub num_instances: usize,
    /// Buffers supplied by the application; these skip recomputation.
    pub buffers: &'a BufferMap,
    /// Handed to every updater.
    pub context: &'a C,
    /// Skip entries in `buffers` that name no registered attribute.
    pub ignore_unknown_attributes: bool,
}

/// Owns the named attributes of one layer.
pub struct AttributeManager<C: ?Sized = dyn Layer> {
    id: String,
    attributes: BTreeMap<String, Attribute<C>>,
    allocated_instances: Option<usize>,
    needs_redraw: bool,
    logger: Rc<Logger>,
    on_update_start: Option<UpdateHook>,
    on_update_end: Option<UpdateHook>,
}

impl<C: ?Sized> AttributeManager<C> {
    pub fn new(id: impl Into<String>, logger: Rc<Logger>) -> Self {
        Self {
            id: id.into(),
            attributes: BTreeMap::new(),
            allocated_instances: None,
            needs_redraw: true,
            logger,
            on_update_start: None,
            on_update_end: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Registers attributes.
    ///
    /// All descriptors are validated before any is added: each needs a
    /// nonzero size and either an updater or `no_alloc`.
    pub fn add<I, S>(&mut self, attributes: I) -> Result<()>
    where
        I: IntoIterator<Item = (S, AttributeDescriptor<C>)>,
        S: Into<String>,
    {
        let attributes: Vec<(String, AttributeDescriptor<C>)> =
            attributes.into_iter().map(|(name, d)| (name.into(), d)).collect();
        for (name, descriptor) in &attributes {
            descriptor.validate(name)?;
        }
        for (name, descriptor) in attributes {
            self.attributes.insert(name, Attribute::from_descriptor(descriptor));
        }
        Ok(())
    }

    /// Registers attributes as instanced.
    #[deprecated(note = "use `add` with `AttributeDescriptor::instanced(true)`")]
    pub fn add_instanced<I, S>(&mut self, attributes: I) -> Result<()>
    where
        I: IntoIterator<Item = (S, AttributeDescriptor<C>)>,
        S: Into<String>,
    {
        self.logger.once(
            0,
            "AttributeManager::add_instanced is deprecated, use add with instanced(true)",
        );
        self.add(attributes.into_iter().map(|(name, d)| (name, d.instanced(true))))
    }

    /// Marks an attribute for recompute on the next update.
    pub fn invalidate(&mut self, name: &str) -> Result<()> {
        let Some(attribute) = self.attributes.get_mut(name) else {
            return Err(OverlayError::UnknownAttribute {
                name: name.to_string(),
                manager: self.id.clone(),
                valid: self.attributes.keys().cloned().collect::<Vec<_>>().join(", "),
            });
        };
        attribute.needs_update = true;
        self.logger
            .log(1, &format!("invalidated attribute {name} for {}", self.id));
        Ok(())
    }

    pub fn invalidate_all(&mut self) {
        for (name, attribute) in &mut self.attributes {
            attribute.needs_update = true;
            self.logger
                .log(1, &format!("invalidated attribute {name} for {}", self.id));
        }
    }

    /// Brings every attribute buffer up to date.
    ///
    /// External buffers are adopted as-is. Everything else is (re)allocated
    /// when too small for `num_instances` and recomputed when dirty.
    pub fn update(&mut self, params: &AttributeUpdate<'_, C>) -> Result<()> {
        self.check_external_buffers(params)?;
        self.set_external_buffers(params.buffers);

        if self.analyze_buffers(params.num_instances)? {
            if let Some(hook) = &self.on_update_start {
                hook(&self.id);
            }
            self.update_buffers(params.num_instances, params.context)?;
            if let Some(hook) = &self.on_update_end {
                hook(&self.id);
            }
        }
        Ok(())
    }

    /// Installs hooks called before and after a recompute pass.
    pub fn set_update_hooks(&mut self, on_start: Option<UpdateHook>, on_end: Option<UpdateHook>) {
        self.on_update_start = on_start;
        self.on_update_end = on_end;
    }

    pub fn get(&self, name: &str) -> Option<&Attribute<C>> {
        self.attributes.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Iterates over attributes in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Attribute<C>)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// All attributes, for binding to a model.
    pub fn get_attributes(&self) -> Vec<AttributeBinding> {
        self.attributes
            .iter()
            .map(|(name, attribute)| AttributeBinding::new(name, attribute))
            .collect()
    }

    /// Attributes changed since the flags were last cleared.
    pub fn get_changed_attributes(&mut self, clear_changed_flags: bool) -> Vec<AttributeBinding> {
        let mut changed = Vec::new();
        for (name, attribute) in &mut self.attributes {
            if attribute.changed {
                changed.push(AttributeBinding::new(name, attribute));
                attribute.changed = !clear_changed_flags;
            }
        }
        changed
    }

    /// Returns the redraw flag, optionally clearing it.
    pub fn get_needs_redraw(&mut self, clear_redraw_flags: bool) -> bool {
        let redraw = self.needs_redraw;
        self.needs_redraw = redraw && !clear_redraw_flags;
        redraw
    }

    pub fn set_needs_redraw(&mut self) {
        self.needs_redraw = true;
    }

    /// Instance count of the last recompute pass (at least 1).
    pub fn allocated_instances(&self) -> Option<usize> {
        self.allocated_instances
    }

    fn check_external_buffers(&self, params: &AttributeUpdate<'_, C>) -> Result<()> {
        for (name, buffer) in params.buffers {
            let Some(attribute) = self.attributes.get(name) else {
                if params.ignore_unknown_attributes {
                    continue;
                }
                return Err(OverlayError::UnknownExternalBuffer(name.clone()));
            };
            if buffer.element_type() != attribute.element_type {
                return Err(OverlayError::ExternalBufferType {
                    name: name.clone(),
                    expected: attribute.element_type.name(),
                    actual: buffer.element_type().name(),
                });
            }
            let expected = buffer_len(name, attribute.size, params.num_instances)?;
            if buffer.len() < expected {
                return Err(OverlayError::ExternalBufferTooSmall {
                    name: name.clone(),
                    expected,
                    actual: buffer.len(),
                });
            }
        }
        Ok(())
    }

    fn set_external_buffers(&mut self, buffers: &BufferMap) {
        for (name, attribute) in &mut self.attributes {
            let was_external = attribute.is_external_buffer;
            attribute.is_external_buffer = false;

            if let Some(buffer) = buffers.get(name) {
                attribute.is_external_buffer = true;
                attribute.needs_update = false;
                let same = attribute
                    .value
                    .as_ref()
                    .is_some_and(|value| Rc::ptr_eq(value, buffer));
                if !same {
                    attribute.value = Some(Rc::clone(buffer));
                    attribute.changed = true;
                    self.needs_redraw = true;
                }
            } else if was_external {
                // The application stopped supplying this buffer
                attribute.value = None;
                attribute.needs_update = true;
            }
        }
    }

    fn analyze_buffers(&mut self, num_instances: usize) -> Result<bool> {
        let mut needs_update = false;
        for (name, attribute) in &mut self.attributes {
            if attribute.is_external_buffer {
                continue;
            }
            buffer_len(name, attribute.size, num_instances.max(1))?;
            let needs_alloc = attribute
                .value
                .as_ref()
                .map_or(true, |value| value.len() / attribute.size < num_instances);
            if needs_alloc && attribute.update.is_some() {
                attribute.needs_alloc = true;
                needs_update = true;
            }
            if attribute.needs_update {
                needs_update = true;
            }
        }
        Ok(needs_update)
    }

    fn update_buffers(&mut self, num_instances: usize, context: &C) -> Result<()> {
        // At least one instance so every attribute has a valid buffer
        let alloc_count = num_instances.max(1);

        for (name, attribute) in &mut self.attributes {
            let len = buffer_len(name, attribute.size, alloc_count)?;
            if attribute.needs_alloc {
                attribute.value =
                    Some(Rc::new(AttributeBuffer::zeroed(attribute.element_type, len)));
                self.logger
                    .log(2, &format!("{}:{name} allocated {alloc_count}", self.id));
                attribute.needs_alloc = false;
                attribute.needs_update = true;
            }

            if attribute.needs_update {
                if let Some(update) = &attribute.update {
                    self.logger
                        .log(2, &format!("{}:{name} updating {num_instances}", self.id));
                    let size = attribute.size;
                    let element_type = attribute.element_type;
                    let value = attribute
                        .value
                        .get_or_insert_with(|| Rc::new(AttributeBuffer::zeroed(element_type, len)));
                    update(
                        Rc::make_mut(value),
                        &UpdateArgs {
                            context,
                            num_instances,
                            size,
                        },
                    );
                } else {
                    self.logger
                        .log(2, &format!("{}:{name} missing update function", self.id));
                }
                attribute.needs_update = false;
                attribute.changed = true;
                self.needs_redraw = true;
            }
        }

        self.allocated_instances = Some(alloc_count);
        Ok(())
    }
}

/// Element count of a buffer holding `num_instances` values of `size`.
fn buffer_len(name: &str, size: usize, num_instances: usize) -> Result<usize> {
    size.checked_mul(num_instances)
        .ok_or_else(|| OverlayError::AttributeTooLarge {
            name: name.to_string(),
            size,
            num_instances,
        })
}

impl<C: ?Sized> fmt::Debug for AttributeManager<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttributeManager")
            .field("id", &self.id)
            .field("attributes", &self.attributes)
            .field("allocated_instances", &self.allocated_instances)
            .field("needs_redraw", &self.needs_redraw)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::ElementType;
    use std::cell::Cell;

    /// Updater context that counts calls.
    #[derive(Default)]
    struct Counter {
        calls: Cell<usize>,
    }

    fn fill_index(buffer: &mut AttributeBuffer, args: &UpdateArgs<'_, Counter>) {
        args.context.calls.set(args.context.calls.get() + 1);
        if let Some(values) = buffer.as_f32_mut() {
            for i in 0..args.num_instances {
                for c in 0..args.size {
                    values[i * args.size + c] = i as f32;
                }
            }
        }
    }

    fn manager() -> AttributeManager<Counter> {
        let mut manager = AttributeManager::new("test-layer", Rc::new(Logger::default()));
        manager
            .add([
                ("positions", AttributeDescriptor::new(3).update(fill_index)),
                ("radius", AttributeDescriptor::new(1).update(fill_index)),
            ])
            .unwrap();
        manager
    }

    fn run(manager: &mut AttributeManager<Counter>, counter: &Counter, n: usize) {
        let buffers = BufferMap::new();
        manager
            .update(&AttributeUpdate {
                num_instances: n,
                buffers: &buffers,
                context: counter,
                ignore_unknown_attributes: false,
            })
            .unwrap();
    }

    #[test]
    fn test_second_update_is_a_no_op() {
        let mut manager = manager();
        let counter = Counter::default();
        run(&mut manager, &counter, 10);
        assert_eq!(counter.calls.get(), 2);
        run(&mut manager, &counter, 10);
        assert_eq!(counter.calls.get(), 2);
    }

    #[test]
    fn test_changed_attributes_clear() {
        let mut manager = manager();
        let counter = Counter::default();
        run(&mut manager, &counter, 4);
        assert_eq!(manager.get_changed_attributes(false).len(), 2);
        assert_eq!(manager.get_changed_attributes(true).len(), 2);
        assert!(manager.get_changed_attributes(true).is_empty());
    }

    #[test]
    fn test_grow_reallocates_shrink_does_not() {
        let mut manager = manager();
        let counter = Counter::default();
        run(&mut manager, &counter, 4);
        manager.get_changed_attributes(true);
        assert_eq!(manager.get("positions").unwrap().capacity(), 4);

        run(&mut manager, &counter, 8);
        let positions = manager.get("positions").unwrap();
        assert_eq!(positions.capacity(), 8);
        assert!(positions.changed());
        assert_eq!(manager.allocated_instances(), Some(8));
        manager.get_changed_attributes(true);

        let calls = counter.calls.get();
        run(&mut manager, &counter, 2);
        assert_eq!(counter.calls.get(), calls);
        assert_eq!(manager.get("positions").unwrap().capacity(), 8);
        assert!(manager.get_changed_attributes(false).is_empty());
    }

    #[test]
    fn test_empty_data_allocates_one_instance() {
        let mut manager = manager();
        let counter = Counter::default();
        run(&mut manager, &counter, 0);
        assert_eq!(manager.allocated_instances(), Some(1));
        assert_eq!(manager.get("positions").unwrap().value().unwrap().len(), 3);
    }

    #[test]
    fn test_invalidate() {
        let mut manager = manager();
        let counter = Counter::default();
        run(&mut manager, &counter, 3);
        manager.invalidate("radius").unwrap();
        run(&mut manager, &counter, 3);
        assert_eq!(counter.calls.get(), 3);

        manager.invalidate_all();
        run(&mut manager, &counter, 3);
        assert_eq!(counter.calls.get(), 5);

        let err = manager.invalidate("colour").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("colour"), "{message}");
        assert!(message.contains("positions, radius"), "{message}");
    }

    #[test]
    fn test_external_buffers() {
        let mut manager = manager();
        let counter = Counter::default();
        let external = Rc::new(AttributeBuffer::from(vec![7.0_f32; 4]));
        let mut buffers = BufferMap::new();
        buffers.insert("radius".to_string(), Rc::clone(&external));

        let params = AttributeUpdate {
            num_instances: 4,
            buffers: &buffers,
            context: &counter,
            ignore_unknown_attributes: false,
        };
        manager.update(&params).unwrap();
        // Only positions was computed
        assert_eq!(counter.calls.get(), 1);
        let radius = manager.get("radius").unwrap();
        assert!(radius.is_external_buffer());
        assert_eq!(radius.value(), Some(external.as_ref()));
        manager.get_changed_attributes(true);

        // Same buffer again is not a change
        manager.update(&params).unwrap();
        assert!(manager.get_changed_attributes(true).is_empty());

        // Dropping the external buffer brings back the updater
        run(&mut manager, &counter, 4);
        assert_eq!(counter.calls.get(), 2);
        assert!(!manager.get("radius").unwrap().is_external_buffer());
    }

    #[test]
    fn test_external_buffer_errors() {
        let mut manager = manager();
        let counter = Counter::default();
        let check = |manager: &mut AttributeManager<Counter>,
                     name: &str,
                     buffer: AttributeBuffer,
                     ignore| {
            let mut buffers = BufferMap::new();
            buffers.insert(name.to_string(), Rc::new(buffer));
            manager.update(&AttributeUpdate {
                num_instances: 4,
                buffers: &buffers,
                context: &counter,
                ignore_unknown_attributes: ignore,
            })
        };

        assert!(matches!(
            check(&mut manager, "sizes", AttributeBuffer::from(vec![0.0_f32; 4]), false),
            Err(OverlayError::UnknownExternalBuffer(_))
        ));
        let sizes = AttributeBuffer::from(vec![0.0_f32; 4]);
        assert!(check(&mut manager, "sizes", sizes, true).is_ok());
        assert!(matches!(
            check(&mut manager, "radius", AttributeBuffer::from(vec![0_u8; 4]), false),
            Err(OverlayError::ExternalBufferType { expected: "f32", actual: "u8", .. })
        ));
        assert!(matches!(
            check(&mut manager, "positions", AttributeBuffer::from(vec![0.0_f32; 11]), false),
            Err(OverlayError::ExternalBufferTooSmall { expected: 12, actual: 11, .. })
        ));
    }

    #[test]
    fn test_no_alloc_attribute_is_not_allocated() {
        let mut manager: AttributeManager<Counter> =
            AttributeManager::new("indices", Rc::new(Logger::default()));
        manager
            .add([(
                "indices",
                AttributeDescriptor::new(1)
                    .element_type(ElementType::Uint32)
                    .indexed(true)
                    .no_alloc(),
            )])
            .unwrap();
        let counter = Counter::default();
        run(&mut manager, &counter, 5);
        assert!(manager.get("indices").unwrap().value().is_none());
        assert!(manager.get_changed_attributes(true).is_empty());
    }

    #[test]
    fn test_add_is_all_or_nothing() {
        let mut manager: AttributeManager<Counter> =
            AttributeManager::new("bad", Rc::new(Logger::default()));
        let result = manager.add([
            ("positions", AttributeDescriptor::new(3).update(fill_index)),
            ("colors", AttributeDescriptor::new(4)),
        ]);
        assert!(matches!(result, Err(OverlayError::MissingAttributeUpdate(_))));
        assert!(manager.is_empty());
    }

    #[test]
    fn test_redraw_flag_peek_and_clear() {
        let mut manager = manager();
        let counter = Counter::default();
        assert!(manager.get_needs_redraw(true));
        assert!(!manager.get_needs_redraw(false));
        run(&mut manager, &counter, 2);
        assert!(manager.get_needs_redraw(false));
        assert!(manager.get_needs_redraw(true));
        assert!(!manager.get_needs_redraw(true));
        manager.set_needs_redraw();
        assert!(manager.get_needs_redraw(true));
    }

    #[test]
    fn test_held_binding_is_copy_on_write() {
        let mut manager = manager();
        let counter = Counter::default();
        run(&mut manager, &counter, 2);
        let bindings = manager.get_changed_attributes(true);
        let held = bindings
            .iter()
            .find(|b| b.name == "positions")
            .and_then(|b| b.value.clone())
            .unwrap();

        manager.invalidate("positions").unwrap();
        run(&mut manager, &counter, 2);
        let current = manager.get("positions").unwrap().value().unwrap();
        assert_eq!(current, held.as_ref());
        assert!(!std::ptr::eq(current, held.as_ref()));
    }

    #[test]
    fn test_oversized_instance_count_is_an_error() {
        let mut manager = manager();
        let counter = Counter::default();
        let buffers = BufferMap::new();
        let result = manager.update(&AttributeUpdate {
            num_instances: usize::MAX,
            buffers: &buffers,
            context: &counter,
            ignore_unknown_attributes: false,
        });
        assert!(matches!(
            result,
            Err(OverlayError::AttributeTooLarge { ref name, size: 3, .. }) if name == "positions"
        ));
        assert_eq!(counter.calls.get(), 0);
        assert_eq!(manager.allocated_instances(), None);

        let mut buffers = BufferMap::new();
        buffers.insert("positions".to_string(), Rc::new(AttributeBuffer::from(vec![0.0_f32; 3])));
        let result = manager.update(&AttributeUpdate {
            num_instances: usize::MAX / 2,
            buffers: &buffers,
            context: &counter,
            ignore_unknown_attributes: false,
        });
        assert!(matches!(result, Err(OverlayError::AttributeTooLarge { .. })));
    }

    #[test]
    fn test_update_hooks() {
        let mut manager = manager();
        let counter = Counter::default();
        let events = Rc::new(std::cell::RefCell::new(Vec::new()));
        let start = Rc::clone(&events);
        let end = Rc::clone(&events);
        manager.set_update_hooks(
            Some(Box::new(move |id| start.borrow_mut().push(format!("start {id}")))),
            Some(Box::new(move |id| end.borrow_mut().push(format!("end {id}")))),
        );
        run(&mut manager, &counter, 1);
        run(&mut manager, &counter, 1);
        assert_eq!(*events.borrow(), vec!["start test-layer", "end test-layer"]);
    }
}
