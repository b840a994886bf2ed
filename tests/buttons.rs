use anyhow::anyhow;
use std::cell::Cell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;
use ting_sdk::button::{ActionKind, ButtonState, Buttons, DEFAULT_HOLD_TIME};
use ting_sdk::clock::{Clock, ManualClock};
use ting_sdk::run_loop::{LoopConfig, RunLoop};

fn fast_loop() -> RunLoop {
    RunLoop::with_config(LoopConfig {
        idle_slice: Duration::from_millis(5),
        wait_quantum: Duration::from_millis(1),
        fault_pause: Duration::ZERO,
    })
}

fn counter() -> (Rc<Cell<u32>>, impl FnMut() -> anyhow::Result<()>) {
    let count = Rc::new(Cell::new(0));
    let inner = count.clone();
    (count, move || {
        inner.set(inner.get() + 1);
        Ok(())
    })
}

#[test]
fn buttons_are_named_in_index_order() {
    let buttons = Buttons::new(DEFAULT_HOLD_TIME, Arc::new(ManualClock::new(0.0)));
    assert!(std::ptr::eq(buttons.by_index(0).unwrap(), buttons.left()));
    assert!(std::ptr::eq(buttons.by_index(1).unwrap(), buttons.midleft()));
    assert!(std::ptr::eq(buttons.by_index(2).unwrap(), buttons.midright()));
    assert!(std::ptr::eq(buttons.by_index(3).unwrap(), buttons.right()));
    assert!(std::ptr::eq(buttons.get("RIGHT").unwrap(), buttons.right()));
    assert!(buttons.get("middle").is_none());
    assert!(buttons.by_index(4).is_none());
}

#[test]
fn edge_sink_stamps_with_clock_and_works_across_threads() {
    let clock = Arc::new(ManualClock::new(5.0));
    let buttons = Buttons::new(DEFAULT_HOLD_TIME, clock.clone());
    let sink = buttons.edge_sink();

    let worker_clock = clock.clone();
    std::thread::spawn(move || {
        sink.button_callback(1, ButtonState::Down);
        worker_clock.advance(0.25);
        sink.button_callback(1, ButtonState::Up);
        sink.button_callback(9, ButtonState::Down);
    })
    .join()
    .unwrap();

    let midleft = buttons.midleft();
    midleft.process_events(clock.now());
    let actions = midleft.actions();
    let kinds: Vec<ActionKind> = actions.iter().map(|a| a.kind).collect();
    assert_eq!(kinds, vec![ActionKind::Down, ActionKind::Up, ActionKind::Press]);
    assert_eq!(actions[0].timestamp, 5.0);
    assert_eq!(actions[1].timestamp, 5.25);
    assert!(buttons.left().actions().is_empty());
}

#[test]
fn installed_buttons_dispatch_from_the_wait_spin() {
    let clock = Arc::new(ManualClock::new(100.0));
    let buttons = Rc::new(Buttons::new(DEFAULT_HOLD_TIME, clock.clone()));
    let rl = fast_loop();
    buttons.install(&rl);

    let (presses, on_press) = counter();
    buttons.midright().on_press(on_press);
    let (holds, on_hold) = counter();
    buttons.left().on_hold(on_hold);
    let (ups, on_up) = counter();
    buttons.left().on_up(on_up);

    let sink = buttons.edge_sink();
    sink.button_callback(2, ButtonState::Down);
    sink.button_callback(0, ButtonState::Down);
    clock.advance(0.3);
    sink.button_callback(2, ButtonState::Up);
    clock.advance(1.0);

    rl.after(Duration::from_millis(20), |rl| {
        rl.stop();
        Ok(())
    });
    rl.run();

    assert_eq!(presses.get(), 1);
    assert_eq!(holds.get(), 1);
    assert_eq!(ups.get(), 0);
}

#[test]
fn failing_button_callback_is_reported_once() {
    let clock = Arc::new(ManualClock::new(0.0));
    let buttons = Rc::new(Buttons::new(DEFAULT_HOLD_TIME, clock.clone()));
    let rl = fast_loop();
    buttons.install(&rl);

    let (faults, mut on_fault) = counter();
    rl.set_fault_hook(move |_| {
        let _ = on_fault();
    });
    buttons.right().on_down(|| Err(anyhow!("no handler for right")));

    buttons.right().add_event(ButtonState::Down, None);
    rl.after(Duration::from_millis(10), |rl| {
        rl.stop();
        Ok(())
    });
    rl.run();

    assert_eq!(faults.get(), 1);
}
