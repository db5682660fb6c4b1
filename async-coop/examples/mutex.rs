//! Mutex shared between tasks
//!
//! Expected output:
//!
//! ``` text
//! B: before lock
//! A: before write
//! A: after releasing the lock
//! A: yield
//! B: 42
//! DONE
//! ```
//!
//! Run with `cargo run --example mutex --features std`

#![deny(unsafe_code)]
#![deny(warnings)]

use async_coop::{
    port::hosted::StdPort, task, unsync::Mutex, FastScheduler, IrqReady, Scheduler, Stack,
};

fn main() {
    static IRQ: IrqReady<2> = IrqReady::new();

    let mut stack = Stack::<1024>::new();
    let x = Mutex::new(0i64);
    let sched: FastScheduler<'_, StdPort, 2> = Scheduler::new(StdPort::new(), &IRQ);
    let (sched, x) = (&sched, &x);

    let mut lock = x.try_lock(sched).unwrap();

    sched
        .spawn(&mut stack, async move {
            println!("A: before write");
            *lock = 42;
            drop(lock);

            println!("A: after releasing the lock");

            loop {
                println!("A: yield");
                task::r#yield(sched).await;
            }
        })
        .unwrap();

    sched.run(async {
        println!("B: before lock");

        // cannot immediately make progress; context switch to A
        let lock = x.lock(sched).await.unwrap();

        println!("B: {}", *lock);

        println!("DONE");
    })
}
