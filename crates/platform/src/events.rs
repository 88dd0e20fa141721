//! Typed input events and a single-threaded publish/subscribe bus.
//!
//! Subscribers register a closure and receive a [`Subscription`]. Dropping
//! the token removes the handler, so a subscriber cannot outlive the state
//! its closure captures by accident.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::rc::{Rc, Weak};

use winit::event::{ElementState, WindowEvent};
use winit::keyboard::PhysicalKey;

use crate::input::{KeyCode, MouseButton};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ButtonState {
    Pressed,
    Released,
}

impl From<ElementState> for ButtonState {
    fn from(state: ElementState) -> Self {
        match state {
            ElementState::Pressed => ButtonState::Pressed,
            ElementState::Released => ButtonState::Released,
        }
    }
}

/// Input delivered by the window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    Key { code: KeyCode, state: ButtonState },
    MouseButton { button: MouseButton, state: ButtonState },
    CursorMoved { x: f32, y: f32 },
    Resized { width: u32, height: u32 },
}

impl InputEvent {
    /// Translates the subset of window events the application reacts to.
    pub fn from_window_event(event: &WindowEvent) -> Option<Self> {
        match event {
            WindowEvent::KeyboardInput { event, .. } => match event.physical_key {
                PhysicalKey::Code(code) => Some(InputEvent::Key {
                    code,
                    state: event.state.into(),
                }),
                PhysicalKey::Unidentified(_) => None,
            },
            WindowEvent::MouseInput { state, button, .. } => Some(InputEvent::MouseButton {
                button: (*button).into(),
                state: (*state).into(),
            }),
            WindowEvent::CursorMoved { position, .. } => Some(InputEvent::CursorMoved {
                x: position.x as f32,
                y: position.y as f32,
            }),
            WindowEvent::Resized(size) => Some(InputEvent::Resized {
                width: size.width,
                height: size.height,
            }),
            _ => None,
        }
    }

    /// True for the press edge of `key`.
    pub fn is_key_press(&self, key: KeyCode) -> bool {
        matches!(
            self,
            InputEvent::Key { code, state: ButtonState::Pressed } if *code == key
        )
    }
}

type Handler = Box<dyn FnMut(&InputEvent)>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    handlers: BTreeMap<u64, Handler>,
    // Handlers unsubscribed while they were being dispatched.
    cancelled: HashSet<u64>,
}

/// Delivers [`InputEvent`]s to subscribers in subscription order.
#[derive(Clone, Default)]
pub struct EventBus {
    registry: Rc<RefCell<Registry>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler`. It stays registered for as long as the returned
    /// token is alive.
    #[must_use = "dropping the subscription unsubscribes the handler"]
    pub fn subscribe(&self, handler: impl FnMut(&InputEvent) + 'static) -> Subscription {
        let mut registry = self.registry.borrow_mut();
        let id = registry.next_id;
        registry.next_id += 1;
        registry.handlers.insert(id, Box::new(handler));

        Subscription {
            id,
            registry: Rc::downgrade(&self.registry),
        }
    }

    /// Calls every live handler with `event`.
    ///
    /// Handlers may subscribe or unsubscribe while running; new handlers
    /// first see the next event.
    pub fn publish(&self, event: &InputEvent) {
        let ids: Vec<u64> = self.registry.borrow().handlers.keys().copied().collect();

        for id in ids {
            let handler = self.registry.borrow_mut().handlers.remove(&id);
            let Some(mut handler) = handler else {
                continue;
            };

            handler(event);

            let mut registry = self.registry.borrow_mut();
            if !registry.cancelled.remove(&id) {
                registry.handlers.insert(id, handler);
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry.borrow().handlers.len()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// Token returned by [`EventBus::subscribe`]. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    registry: Weak<RefCell<Registry>>,
}

impl Subscription {
    /// Explicit form of dropping the token.
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        let mut registry = registry.borrow_mut();
        if registry.handlers.remove(&self.id).is_none() {
            registry.cancelled.insert(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn press(code: KeyCode) -> InputEvent {
        InputEvent::Key {
            code,
            state: ButtonState::Pressed,
        }
    }

    #[test]
    fn test_subscribers_receive_events_in_order() {
        let bus = EventBus::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        let first = {
            let log = log.clone();
            bus.subscribe(move |_| log.borrow_mut().push(1))
        };
        let second = {
            let log = log.clone();
            bus.subscribe(move |_| log.borrow_mut().push(2))
        };

        bus.publish(&press(KeyCode::KeyW));
        assert_eq!(*log.borrow(), vec![1, 2]);
        drop((first, second));
    }

    #[test]
    fn test_dropping_token_unsubscribes() {
        let bus = EventBus::new();
        let hits = Rc::new(Cell::new(0));

        let token = {
            let hits = hits.clone();
            bus.subscribe(move |_| hits.set(hits.get() + 1))
        };
        bus.publish(&press(KeyCode::KeyR));
        assert_eq!(bus.subscriber_count(), 1);

        token.unsubscribe();
        bus.publish(&press(KeyCode::KeyR));
        assert_eq!(hits.get(), 1);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_handler_can_drop_its_own_subscription() {
        let bus = EventBus::new();
        let slot: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));
        let hits = Rc::new(Cell::new(0));

        let token = {
            let slot = slot.clone();
            let hits = hits.clone();
            bus.subscribe(move |_| {
                hits.set(hits.get() + 1);
                slot.borrow_mut().take();
            })
        };
        *slot.borrow_mut() = Some(token);

        bus.publish(&press(KeyCode::KeyQ));
        bus.publish(&press(KeyCode::KeyQ));
        assert_eq!(hits.get(), 1);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_token_outliving_bus_is_harmless() {
        let bus = EventBus::new();
        let token = bus.subscribe(|_| {});
        drop(bus);
        drop(token);
    }

    #[test]
    fn test_is_key_press() {
        assert!(press(KeyCode::Escape).is_key_press(KeyCode::Escape));
        assert!(!press(KeyCode::Escape).is_key_press(KeyCode::Space));
        let release = InputEvent::Key {
            code: KeyCode::Escape,
            state: ButtonState::Released,
        };
        assert!(!release.is_key_press(KeyCode::Escape));
    }
}
