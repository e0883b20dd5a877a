//! Counter application with independent components sharing state

use std::sync::Arc;

use staterepo::{Reader, StateRepo, Writer};
use tracing_subscriber::EnvFilter;

#[derive(Clone, Debug)]
struct CounterState {
    count: i32,
    step: i32,
    history: Vec<i32>,
}

impl CounterState {
    fn new() -> Self {
        Self {
            count: 0,
            step: 1,
            history: vec![0],
        }
    }

    fn increment(&self) -> Self {
        let mut next = self.clone();
        next.count += next.step;
        next.history.push(next.count);
        next
    }

    fn decrement(&self) -> Self {
        let mut next = self.clone();
        next.count -= next.step;
        next.history.push(next.count);
        next
    }
}

/// Owns the counter and is the only component allowed to change it.
struct Controls {
    counter: Writer<CounterState>,
}

impl Controls {
    fn mount(repo: &StateRepo, initial: Option<CounterState>) -> staterepo::Result<Self> {
        let counter = repo.writer("counter", initial)?;
        Ok(Self { counter })
    }

    fn click_plus(&self) {
        println!("   [Controls] +");
        self.counter
            .set(|state| state.cloned().unwrap_or_else(CounterState::new).increment());
    }

    fn click_minus(&self) {
        println!("   [Controls] -");
        self.counter
            .set(|state| state.cloned().unwrap_or_else(CounterState::new).decrement());
    }

    fn set_step(&self, step: i32) {
        println!("   [Controls] step = {step}");
        self.counter.set(|state| {
            let mut next = state.cloned().unwrap_or_else(CounterState::new);
            next.step = step;
            next
        });
    }
}

/// Renders the current count.
fn mount_display(repo: &StateRepo) -> staterepo::Result<Reader<CounterState>> {
    repo.reader("counter", |state: &CounterState, _| {
        println!("   [Display] Count: {}, Step: {}", state.count, state.step);
    })
}

/// Tracks the history and stops listening once the count reaches a limit.
fn mount_history(repo: &StateRepo, limit: i32) -> staterepo::Result<Reader<CounterState>> {
    repo.reader("counter", move |state: &CounterState, me| {
        println!("   [History] {:?}", state.history);
        if state.count >= limit {
            println!("   [History] limit {limit} reached, unmounting");
            me.unregister();
        }
    })
}

fn main() -> staterepo::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== Shared Counter ===\n");
    let repo = Arc::new(StateRepo::new());

    println!("1. Mounting controls (writer)");
    let controls = Controls::mount(&repo, Some(CounterState::new()))?;

    println!("\n2. Mounting display and history (readers replay the current value)");
    let display = mount_display(&repo)?;
    let _history = mount_history(&repo, 3)?;

    println!("\n3. Clicking");
    controls.click_plus();
    controls.set_step(2);
    controls.click_plus();
    controls.click_plus();

    println!("\n4. Hiding the display");
    display.unregister();
    controls.click_minus();

    println!("\n5. Showing the display again (no replay, waits for the next change)");
    display.register();
    controls.click_minus();

    println!("\n6. A second set of controls is refused");
    match Controls::mount(&repo, Some(CounterState::new())) {
        Ok(_) => println!("   unexpected second writer"),
        Err(err) => println!("   {err}"),
    }

    println!("\n7. Unmounting the controls frees the slot, the value stays");
    drop(controls);
    let replacement = Controls::mount(&repo, None)?;
    replacement.click_plus();

    println!(
        "\nFinal count: {:?}",
        display.value().map(|state| state.count)
    );
    Ok(())
}
