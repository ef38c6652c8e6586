//! ksync demo: hosted kernel threads sleeping on the alarm and trading words

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use ksync::arch::HostMachine;
use ksync::kern::counters;
use ksync::kern::machine::Clock;
use ksync::{kprintln, Alarm, Communicator, Config};
use log::{error, info, LevelFilter};

const SPEAKERS: i32 = 3;
const WORDS_PER_SPEAKER: i32 = 4;

fn main() {
    let config = Config::new().with_log_level(LevelFilter::Info);
    if let Err(e) = ksync::init(&config) {
        eprintln!("logger: {}", e);
    }

    kprintln!("\n=== {} v{} ===", ksync::NAME, ksync::VERSION);

    counters::reset_all();
    let machine = Arc::new(HostMachine::from_config(&config));
    let alarm = match Alarm::install(machine.clone()) {
        Ok(alarm) => alarm,
        Err(e) => {
            error!("alarm: {}", e);
            return;
        }
    };
    let comm = Arc::new(Communicator::from_config(machine.clone(), &config));
    info!("communicator in {:?} mode", comm.mode());

    let speakers: Vec<_> = (0..SPEAKERS)
        .map(|id| {
            let alarm = alarm.clone();
            let comm = comm.clone();
            thread::spawn(move || {
                for n in 0..WORDS_PER_SPEAKER {
                    alarm.wait_until(config.timer_period * (id as u64 + 1));
                    comm.speak(id * 100 + n);
                }
            })
        })
        .collect();

    let listener = {
        let comm = comm.clone();
        let machine = machine.clone();
        thread::spawn(move || {
            for _ in 0..SPEAKERS * WORDS_PER_SPEAKER {
                let word = comm.listen();
                kprintln!("[tick {:>6}] heard {}", machine.ticks(), word);
            }
        })
    };

    while !listener.is_finished() {
        machine.tick();
        thread::sleep(Duration::from_millis(2));
    }

    for speaker in speakers {
        if speaker.join().is_err() {
            error!("speaker thread panicked");
        }
    }
    if listener.join().is_err() {
        error!("listener thread panicked");
    }

    let stats = counters::snapshot();
    kprintln!("timer interrupts: {}", stats.timer_interrupts);
    kprintln!("alarm wakeups:    {}", stats.alarm_wakeups);
    kprintln!("words spoken:     {}", stats.words_spoken);
    kprintln!("words heard:      {}", stats.words_heard);
}
