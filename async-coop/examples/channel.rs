//! Message passing between tasks, and from a thread standing in for an interrupt handler
//!
//! Expected output:
//!
//! ``` text
//! B: before get
//! A: before put
//! A: after put
//! A: waiting for the "interrupt"
//! B: 42
//! A: got 7 from the "interrupt"
//! DONE
//! ```
//!
//! Run with `cargo run --example channel --features std`

#![deny(unsafe_code)]
#![deny(warnings)]

use std::{thread, time::Duration};

use async_coop::{
    port::hosted::StdPort, sync, task, unsync::Channel, FastScheduler, IrqReady, Scheduler,
    Stack,
};

static IRQ: IrqReady<2> = IrqReady::new();
static RX: sync::Channel<u8, 4> = sync::Channel::new();

fn main() {
    let mut stack = Stack::<2048>::new();
    let c = Channel::<i32, 1>::new();
    let sched: FastScheduler<'_, StdPort, 2> = Scheduler::new(StdPort::new(), &IRQ);
    let (sched, c) = (&sched, &c);

    let a = sched
        .spawn(&mut stack, async move {
            println!("A: before put");
            c.put(sched, 42).await.unwrap();
            println!("A: after put");

            thread::spawn(|| {
                thread::sleep(Duration::from_millis(50));
                RX.put_in_irq(7).ok();
            });

            println!("A: waiting for the \"interrupt\"");
            let byte = RX.get_from_irq(sched).await.unwrap();
            println!("A: got {} from the \"interrupt\"", byte);
        })
        .unwrap();

    sched.run(async {
        println!("B: before get");

        // cannot immediately make progress; context switch to A
        let msg = c.get(sched).await.unwrap();
        println!("B: {}", msg);

        task::join(sched, a).await.unwrap();
        println!("DONE");
    })
}
