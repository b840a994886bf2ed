//! Physical button handling.
//!
//! Raw edges arrive from the platform layer (possibly on an interrupt or
//! polling thread) and are queued per button. The run loop later turns them
//! into `down`/`up`/`press`/`hold` actions and invokes the registered
//! callbacks on its own thread.

use crate::callbacks::CallbackList;
use crate::clock::Clock;
use crate::run_loop::RunLoop;
use anyhow::Result;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

/// Default time a button must stay down before it counts as a hold.
pub const DEFAULT_HOLD_TIME: f64 = 1.0;

/// Button names in platform index order.
pub const BUTTON_NAMES: [&str; 4] = ["left", "midleft", "midright", "right"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ButtonState {
    Down,
    Up,
}

impl FromStr for ButtonState {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "down" => Ok(ButtonState::Down),
            "up" => Ok(ButtonState::Up),
            other => anyhow::bail!("unknown button state '{other}'"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Down,
    Up,
    Press,
    Hold,
}

/// A raw hardware edge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ButtonEvent {
    pub state: ButtonState,
    pub timestamp: f64,
}

/// A semantic action derived from edges.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ButtonAction {
    pub kind: ActionKind,
    pub timestamp: f64,
}

/// Producer side of a button's edge queue. Safe to use from any thread.
#[derive(Debug, Clone, Default)]
pub struct EdgeQueue {
    events: Arc<Mutex<VecDeque<ButtonEvent>>>,
}

impl EdgeQueue {
    pub fn push(&self, state: ButtonState, timestamp: f64) {
        let event = ButtonEvent { state, timestamp };
        match self.events.lock() {
            Ok(mut events) => events.push_back(event),
            Err(poisoned) => poisoned.into_inner().push_back(event),
        }
    }

    fn drain(&self) -> Vec<ButtonEvent> {
        match self.events.lock() {
            Ok(mut events) => events.drain(..).collect(),
            Err(poisoned) => poisoned.into_inner().drain(..).collect(),
        }
    }
}

/// Edge-to-action translation for one button.
#[derive(Debug)]
pub struct ButtonStateMachine {
    edges: EdgeQueue,
    last_event: Option<ButtonEvent>,
    hold_time: f64,
    last_hold_check_time: f64,
    actions: Vec<ButtonAction>,
}

impl Default for ButtonStateMachine {
    fn default() -> Self {
        Self::new(DEFAULT_HOLD_TIME)
    }
}

impl ButtonStateMachine {
    pub fn new(hold_time: f64) -> Self {
        Self {
            edges: EdgeQueue::default(),
            last_event: None,
            hold_time,
            last_hold_check_time: f64::NEG_INFINITY,
            actions: Vec::new(),
        }
    }

    pub fn hold_time(&self) -> f64 {
        self.hold_time
    }

    pub fn set_hold_time(&mut self, hold_time: f64) {
        self.hold_time = hold_time;
    }

    pub fn edge_queue(&self) -> EdgeQueue {
        self.edges.clone()
    }

    pub fn add_event(&self, state: ButtonState, timestamp: f64) {
        self.edges.push(state, timestamp);
    }

    /// Pending actions, oldest first.
    pub fn actions(&self) -> &[ButtonAction] {
        &self.actions
    }

    pub fn take_actions(&mut self) -> Vec<ButtonAction> {
        std::mem::take(&mut self.actions)
    }

    /// Drain queued edges and append the resulting actions.
    ///
    /// Hold detection is driven by elapsed time: a button that stays down
    /// produces its `hold` once `current_time` passes the threshold, whether
    /// or not any further edge arrived.
    pub fn process_events(&mut self, current_time: f64) {
        for event in self.edges.drain() {
            self.check_hold(event.timestamp);
            match event.state {
                ButtonState::Down => self.push(ActionKind::Down, event.timestamp),
                ButtonState::Up => {
                    self.push(ActionKind::Up, event.timestamp);
                    if let Some(prev) = self.last_event {
                        // Same threshold expression as `check_hold`, so a
                        // cycle yields press or hold, never both.
                        if prev.state == ButtonState::Down
                            && event.timestamp < prev.timestamp + self.hold_time
                        {
                            self.push(ActionKind::Press, event.timestamp);
                        }
                    }
                }
            }
            self.last_event = Some(event);
            // Nothing after this edge has been checked yet.
            self.last_hold_check_time = event.timestamp;
        }
        self.check_hold(current_time);
    }

    /// Fire `hold` if the threshold of the outstanding `down` falls inside
    /// `(last_hold_check_time, check_time]`.
    fn check_hold(&mut self, check_time: f64) {
        if let Some(last) = self.last_event {
            if last.state == ButtonState::Down {
                let hold_at = last.timestamp + self.hold_time;
                if hold_at > self.last_hold_check_time && hold_at <= check_time {
                    self.push(ActionKind::Hold, hold_at);
                }
            }
        }
        if check_time > self.last_hold_check_time {
            self.last_hold_check_time = check_time;
        }
    }

    fn push(&mut self, kind: ActionKind, timestamp: f64) {
        tracing::trace!(?kind, timestamp, "button action");
        self.actions.push(ButtonAction { kind, timestamp });
    }
}

#[derive(Default)]
struct ButtonCallbacks {
    down: CallbackList,
    up: CallbackList,
    press: CallbackList,
    hold: CallbackList,
}

impl ButtonCallbacks {
    fn for_kind(&self, kind: ActionKind) -> &CallbackList {
        match kind {
            ActionKind::Down => &self.down,
            ActionKind::Up => &self.up,
            ActionKind::Press => &self.press,
            ActionKind::Hold => &self.hold,
        }
    }
}

/// A button with callbacks, owned by the run loop thread.
pub struct Button {
    machine: RefCell<ButtonStateMachine>,
    callbacks: ButtonCallbacks,
    clock: Arc<dyn Clock>,
}

impl Button {
    pub fn new(hold_time: f64, clock: Arc<dyn Clock>) -> Self {
        Self {
            machine: RefCell::new(ButtonStateMachine::new(hold_time)),
            callbacks: ButtonCallbacks::default(),
            clock,
        }
    }

    pub fn edge_queue(&self) -> EdgeQueue {
        self.machine.borrow().edge_queue()
    }

    /// Queue a raw edge, stamped with the clock when `timestamp` is `None`.
    pub fn add_event(&self, state: ButtonState, timestamp: Option<f64>) {
        let timestamp = timestamp.unwrap_or_else(|| self.clock.now());
        self.machine.borrow().add_event(state, timestamp);
    }

    pub fn process_events(&self, current_time: f64) {
        self.machine.borrow_mut().process_events(current_time);
    }

    pub fn actions(&self) -> Vec<ButtonAction> {
        self.machine.borrow().actions().to_vec()
    }

    pub fn hold_time(&self) -> f64 {
        self.machine.borrow().hold_time()
    }

    pub fn set_hold_time(&self, hold_time: f64) {
        self.machine.borrow_mut().set_hold_time(hold_time);
    }

    pub fn on<F>(&self, kind: ActionKind, callback: F)
    where
        F: FnMut() -> Result<()> + 'static,
    {
        self.callbacks.for_kind(kind).add(callback);
    }

    pub fn on_down<F>(&self, callback: F)
    where
        F: FnMut() -> Result<()> + 'static,
    {
        self.on(ActionKind::Down, callback);
    }

    pub fn on_up<F>(&self, callback: F)
    where
        F: FnMut() -> Result<()> + 'static,
    {
        self.on(ActionKind::Up, callback);
    }

    pub fn on_press<F>(&self, callback: F)
    where
        F: FnMut() -> Result<()> + 'static,
    {
        self.on(ActionKind::Press, callback);
    }

    pub fn on_hold<F>(&self, callback: F)
    where
        F: FnMut() -> Result<()> + 'static,
    {
        self.on(ActionKind::Hold, callback);
    }

    /// Invoke callbacks for every pending action in order, then clear them.
    pub fn run_callbacks(&self) -> Result<()> {
        let actions = self.machine.borrow_mut().take_actions();
        let mut first_err = None;
        for action in actions {
            if let Err(err) = self.callbacks.for_kind(action.kind).invoke() {
                if first_err.is_none() {
                    first_err = Some(err);
                } else {
                    tracing::error!("button callback failed: {err:#}");
                }
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Platform-facing sink for `(button_index, state)` edges.
#[derive(Clone)]
pub struct EdgeSink {
    queues: Vec<EdgeQueue>,
    clock: Arc<dyn Clock>,
}

impl EdgeSink {
    /// Queue an edge for the button at `index`, stamped with the clock.
    pub fn button_callback(&self, index: usize, state: ButtonState) {
        match self.queues.get(index) {
            Some(queue) => queue.push(state, self.clock.now()),
            None => tracing::warn!(index, "edge for unknown button index dropped"),
        }
    }
}

/// The device's buttons, keyed by name.
pub struct Buttons {
    buttons: Vec<(&'static str, Button)>,
    clock: Arc<dyn Clock>,
}

impl Buttons {
    pub fn new(hold_time: f64, clock: Arc<dyn Clock>) -> Self {
        let buttons = BUTTON_NAMES
            .iter()
            .map(|name| (*name, Button::new(hold_time, clock.clone())))
            .collect();
        Self { buttons, clock }
    }

    pub fn get(&self, name: &str) -> Option<&Button> {
        self.buttons
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, b)| b)
    }

    pub fn by_index(&self, index: usize) -> Option<&Button> {
        self.buttons.get(index).map(|(_, b)| b)
    }

    pub fn left(&self) -> &Button {
        &self.buttons[0].1
    }

    pub fn midleft(&self) -> &Button {
        &self.buttons[1].1
    }

    pub fn midright(&self) -> &Button {
        &self.buttons[2].1
    }

    pub fn right(&self) -> &Button {
        &self.buttons[3].1
    }

    pub fn edge_sink(&self) -> EdgeSink {
        EdgeSink {
            queues: self.buttons.iter().map(|(_, b)| b.edge_queue()).collect(),
            clock: self.clock.clone(),
        }
    }

    /// Process queued edges and run callbacks for every button.
    pub fn poll(&self, now: f64) -> Result<()> {
        let mut first_err = None;
        for (name, button) in &self.buttons {
            button.process_events(now);
            if let Err(err) = button.run_callbacks() {
                tracing::debug!(button = *name, "button callback failed");
                first_err.get_or_insert(err);
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Register polling as a wait callback on `run_loop`.
    pub fn install(self: &Rc<Self>, run_loop: &RunLoop) {
        let buttons = Rc::clone(self);
        run_loop.add_wait_callback(move || buttons.poll(buttons.clock.now()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::cell::Cell;

    fn kinds(machine: &ButtonStateMachine) -> Vec<ActionKind> {
        machine.actions().iter().map(|a| a.kind).collect()
    }

    #[test]
    fn short_cycle_is_a_press() {
        let mut m = ButtonStateMachine::default();
        m.add_event(ButtonState::Down, 1.0);
        m.add_event(ButtonState::Up, 1.5);
        m.process_events(2.0);
        assert_eq!(kinds(&m), vec![ActionKind::Down, ActionKind::Up, ActionKind::Press]);
    }

    #[test]
    fn long_cycle_is_a_hold_fired_before_up() {
        let mut m = ButtonStateMachine::default();
        m.add_event(ButtonState::Down, 1.0);
        m.add_event(ButtonState::Up, 3.0);
        m.process_events(3.1);
        assert_eq!(kinds(&m), vec![ActionKind::Down, ActionKind::Hold, ActionKind::Up]);
        assert_eq!(m.actions()[1].timestamp, 2.0);
    }

    #[test]
    fn exactly_hold_time_counts_as_hold() {
        let mut m = ButtonStateMachine::default();
        m.add_event(ButtonState::Down, 1.0);
        m.add_event(ButtonState::Up, 2.0);
        m.process_events(2.0);
        assert_eq!(kinds(&m), vec![ActionKind::Down, ActionKind::Hold, ActionKind::Up]);
    }

    #[test]
    fn threshold_boundary_yields_hold_without_press() {
        let mut m = ButtonStateMachine::default();
        m.add_event(ButtonState::Down, 0.13);
        m.add_event(ButtonState::Up, 1.13);
        m.process_events(2.0);
        assert_eq!(kinds(&m), vec![ActionKind::Down, ActionKind::Hold, ActionKind::Up]);
    }

    #[test]
    fn never_both_press_and_hold_for_one_cycle() {
        for i in 0..2_000 {
            let down = i as f64 * 0.01;
            for up in [down + 1.0, 0.01 * i as f64 + 1.0, down + 0.999_999, down + 1.000_001] {
                let mut m = ButtonStateMachine::default();
                m.add_event(ButtonState::Down, down);
                m.add_event(ButtonState::Up, up);
                m.process_events(up + 5.0);
                let k = kinds(&m);
                let presses = k.iter().filter(|a| **a == ActionKind::Press).count();
                let holds = k.iter().filter(|a| **a == ActionKind::Hold).count();
                assert_eq!(presses + holds, 1, "down={down} up={up} actions={k:?}");
            }
        }
    }

    #[test]
    fn hold_fires_incrementally_and_once() {
        let mut m = ButtonStateMachine::default();
        m.add_event(ButtonState::Down, 1.0);
        m.process_events(1.1);
        assert_eq!(kinds(&m), vec![ActionKind::Down]);

        m.process_events(2.1);
        assert_eq!(kinds(&m), vec![ActionKind::Down, ActionKind::Hold]);

        m.process_events(2.5);
        assert_eq!(kinds(&m), vec![ActionKind::Down, ActionKind::Hold]);

        m.add_event(ButtonState::Up, 3.0);
        m.process_events(3.1);
        assert_eq!(kinds(&m), vec![ActionKind::Down, ActionKind::Hold, ActionKind::Up]);
    }

    #[test]
    fn repeated_presses_are_independent() {
        let mut m = ButtonStateMachine::default();
        m.add_event(ButtonState::Down, 1.0);
        m.add_event(ButtonState::Up, 1.5);
        m.add_event(ButtonState::Down, 1.6);
        m.add_event(ButtonState::Up, 2.2);
        m.process_events(4.1);
        assert_eq!(
            kinds(&m),
            vec![
                ActionKind::Down,
                ActionKind::Up,
                ActionKind::Press,
                ActionKind::Down,
                ActionKind::Up,
                ActionKind::Press
            ]
        );
    }

    #[test]
    fn late_delivered_down_still_holds() {
        let mut m = ButtonStateMachine::default();
        m.process_events(10.0);
        m.add_event(ButtonState::Down, 8.0);
        m.process_events(10.5);
        assert_eq!(kinds(&m), vec![ActionKind::Down, ActionKind::Hold]);
    }

    #[test]
    fn parses_platform_states() {
        assert_eq!("down".parse::<ButtonState>().unwrap(), ButtonState::Down);
        assert_eq!(" UP ".parse::<ButtonState>().unwrap(), ButtonState::Up);
        assert!("sideways".parse::<ButtonState>().is_err());
    }

    #[test]
    fn run_callbacks_fires_per_action_and_clears() {
        let clock = Arc::new(ManualClock::new(0.0));
        let button = Button::new(DEFAULT_HOLD_TIME, clock);
        let presses = Rc::new(Cell::new(0));
        let downs = Rc::new(Cell::new(0));
        let p = presses.clone();
        button.on_press(move || {
            p.set(p.get() + 1);
            Ok(())
        });
        let d = downs.clone();
        button.on_down(move || {
            d.set(d.get() + 1);
            Ok(())
        });
        button.add_event(ButtonState::Down, Some(1.0));
        button.add_event(ButtonState::Up, Some(1.2));
        button.process_events(1.3);
        button.run_callbacks().unwrap();
        assert_eq!(presses.get(), 1);
        assert_eq!(downs.get(), 1);
        assert!(button.actions().is_empty());
    }

    #[test]
    fn add_event_without_timestamp_uses_clock() {
        let clock = Arc::new(ManualClock::new(42.0));
        let button = Button::new(DEFAULT_HOLD_TIME, clock);
        button.add_event(ButtonState::Down, None);
        button.process_events(42.0);
        assert_eq!(button.actions()[0].timestamp, 42.0);
    }
}
