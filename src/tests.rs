//! Cross-module scenarios: alarm-paced threads talking through a communicator

use alloc::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::arch::host::{wait_for, HostMachine};
use crate::kern::machine::Clock;
use crate::{Alarm, Communicator, Config, HandoffMode, NAME, VERSION};

const TIMEOUT: Duration = Duration::from_secs(10);

/// Tick `machine` until `done` holds, giving woken threads time to run
fn tick_until(machine: &HostMachine, mut done: impl FnMut() -> bool) {
    for _ in 0..10_000 {
        if done() {
            return;
        }
        machine.tick();
        thread::sleep(Duration::from_millis(1));
    }
    panic!("condition not reached after 10000 ticks");
}

#[test]
fn test_version() {
    assert_eq!(NAME, "ksync");
    assert!(!VERSION.is_empty());
}

#[test]
fn test_init_installs_logger_once() {
    let config = Config::new();
    assert!(crate::init(&config).is_ok());
    assert!(crate::init(&config).is_err());
}

#[test]
fn test_sleeper_speaks_after_waking() {
    let config = Config::new().with_timer_period(100);
    let machine = Arc::new(HostMachine::from_config(&config));
    let alarm = Alarm::install(machine.clone()).unwrap();
    let comm = Arc::new(Communicator::from_config(machine.clone(), &config));

    let producer = {
        let alarm = alarm.clone();
        let comm = comm.clone();
        thread::spawn(move || {
            alarm.wait_until(300);
            let woke = alarm.machine().ticks();
            comm.speak(woke as i32);
        })
    };
    let consumer = {
        let comm = comm.clone();
        thread::spawn(move || comm.listen())
    };

    wait_for(TIMEOUT, || alarm.pending() == 1);
    tick_until(&machine, || producer.is_finished());

    producer.join().unwrap();
    let heard = consumer.join().unwrap();
    assert!(heard >= 300, "producer woke at tick {}", heard);
    assert_eq!(alarm.pending(), 0);
}

#[test]
fn test_staggered_producers_all_heard() {
    const PRODUCERS: i32 = 5;

    let machine = Arc::new(HostMachine::with_period(50));
    let alarm = Alarm::install(machine.clone()).unwrap();
    let comm = Arc::new(Communicator::with_mode(machine.clone(), HandoffMode::Slot));

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|id| {
            let alarm = alarm.clone();
            let comm = comm.clone();
            thread::spawn(move || {
                alarm.wait_until(100 * (id as u64 + 1));
                comm.speak(id);
            })
        })
        .collect();

    let consumer = {
        let comm = comm.clone();
        thread::spawn(move || {
            let mut heard: Vec<i32> = (0..PRODUCERS).map(|_| comm.listen()).collect();
            heard.sort();
            heard
        })
    };

    wait_for(TIMEOUT, || alarm.pending() == PRODUCERS as usize);
    tick_until(&machine, || consumer.is_finished());

    for producer in producers {
        producer.join().unwrap();
    }
    assert_eq!(consumer.join().unwrap(), (0..PRODUCERS).collect::<Vec<_>>());
    assert_eq!(alarm.pending(), 0);
}
