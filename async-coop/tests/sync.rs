use std::{
    cell::{Cell, RefCell},
    mem,
    vec::Vec,
};

use async_coop::{
    port::SimPort,
    task,
    unsync::{Channel, Event, Mutex},
    Cancelled, FastScheduler, IrqReady, Scheduler, Stack,
};

type Sched<'a> = FastScheduler<'a, SimPort, 4>;

#[test]
fn mutex_is_exclusive() {
    static IRQ: IrqReady<4> = IrqReady::new();
    let mut stacks = [Stack::<1024>::new(), Stack::new(), Stack::new()];
    let mutex = Mutex::new(0u32);
    let inside = Cell::new(false);
    let sched: Sched<'_> = Scheduler::new(SimPort::new(1000), &IRQ);
    let sched = &sched;
    let (mutex, inside) = (&mutex, &inside);

    let mut workers = Vec::new();
    for stack in stacks.iter_mut() {
        let worker = sched
            .spawn(stack, async move {
                for _ in 0..3 {
                    let mut guard = mutex.lock(sched).await.unwrap();
                    assert!(!inside.replace(true));
                    task::r#yield(sched).await;
                    *guard += 1;
                    inside.set(false);
                }
            })
            .unwrap();
        workers.push(worker);
    }

    sched.run(async move {
        for worker in workers {
            task::join(sched, worker).await.unwrap();
        }
    });

    assert_eq!(*mutex.try_lock(sched).unwrap(), 9);
}

#[test]
fn unlock_hands_the_mutex_to_the_longest_waiter() {
    static IRQ: IrqReady<4> = IrqReady::new();
    let mut s1 = Stack::<1024>::new();
    let mut s2 = Stack::<1024>::new();
    let mutex = Mutex::new(());
    let order = RefCell::new(Vec::new());
    let sched: Sched<'_> = Scheduler::new(SimPort::new(1000), &IRQ);
    let sched = &sched;
    let (mutex, order) = (&mutex, &order);

    for (stack, id) in [(&mut s1, 1), (&mut s2, 2)] {
        sched
            .spawn(stack, async move {
                let guard = mutex.lock(sched).await.unwrap();
                order.borrow_mut().push(id);
                task::r#yield(sched).await;
                guard.unlock();
            })
            .unwrap();
    }

    sched.run(async {
        let guard = mutex.try_lock(sched).unwrap();
        // both tasks queue up behind us
        task::r#yield(sched).await;
        drop(guard);

        // the first waiter owns it now; no barging
        assert!(mutex.is_locked());
        assert!(mutex.try_lock(sched).is_none());

        let guard = mutex.lock(sched).await.unwrap();
        order.borrow_mut().push(0);
        drop(guard);
    });

    assert_eq!(*order.borrow(), [1, 2, 0]);
    assert!(!mutex.is_locked());
}

#[test]
fn channel_keeps_order_through_a_full_buffer() {
    static IRQ: IrqReady<4> = IrqReady::new();
    let mut producer_stack = Stack::<1024>::new();
    let mut consumer_stack = Stack::<1024>::new();
    let channel = Channel::<u16, 4>::new();
    let received = RefCell::new(Vec::new());
    let sched: Sched<'_> = Scheduler::new(SimPort::new(1000), &IRQ);
    let sched = &sched;
    let (channel, received) = (&channel, &received);

    let values = (0..10).map(|i| 0xA500 + i).collect::<Vec<u16>>();
    let sent = values.clone();

    let producer = sched
        .spawn(&mut producer_stack, async move {
            for value in sent {
                channel.put(sched, value).await.unwrap();
            }
        })
        .unwrap();
    let consumer = sched
        .spawn(&mut consumer_stack, async move {
            for _ in 0..10 {
                let value = channel.get(sched).await.unwrap();
                received.borrow_mut().push(value);
            }
        })
        .unwrap();

    sched.run(async {
        // the producer filled the buffer before the consumer ran at all
        task::r#yield(sched).await;
        task::join(sched, producer).await.unwrap();
        task::join(sched, consumer).await.unwrap();
    });

    assert_eq!(*received.borrow(), values);
    assert!(channel.is_empty());
    assert_eq!(channel.capacity(), 4);
}

#[test]
fn bulk_transfers_larger_than_the_capacity() {
    static IRQ: IrqReady<4> = IrqReady::new();
    let mut producer_stack = Stack::<1024>::new();
    let mut consumer_stack = Stack::<1024>::new();
    let channel = Channel::<u16, 4>::new();
    let received = RefCell::new([0u16; 10]);
    let sched: Sched<'_> = Scheduler::new(SimPort::new(1000), &IRQ);
    let sched = &sched;
    let (channel, received) = (&channel, &received);

    const DATA: [u16; 10] = [3, 1, 4, 1, 5, 9, 2, 6, 5, 3];

    sched
        .spawn(&mut producer_stack, async move {
            channel.put_n(sched, &DATA).await.unwrap();
        })
        .unwrap();
    let consumer = sched
        .spawn(&mut consumer_stack, async move {
            let mut buf = [0; 10];
            channel.get_n(sched, &mut buf).await.unwrap();
            *received.borrow_mut() = buf;
        })
        .unwrap();

    sched.run(async {
        task::join(sched, consumer).await.unwrap();
    });

    assert_eq!(*received.borrow(), DATA);
    assert!(channel.is_empty());
}

#[test]
fn try_put_and_try_get() {
    static IRQ: IrqReady<4> = IrqReady::new();
    let channel = Channel::<u8, 2>::new();
    let sched: Sched<'_> = Scheduler::new(SimPort::new(1000), &IRQ);

    assert_eq!(channel.try_get(&sched), None);
    assert_eq!(channel.try_put(&sched, 1), Ok(()));
    assert_eq!(channel.try_put(&sched, 2), Ok(()));
    assert!(channel.is_full());
    assert_eq!(channel.try_put(&sched, 3), Err(3));
    assert_eq!(channel.len(), 2);
    assert_eq!(channel.try_get(&sched), Some(1));
    assert_eq!(channel.try_get(&sched), Some(2));
}

#[test]
fn dead_mutex_owner_releases_waiters_with_cancellation() {
    static IRQ: IrqReady<4> = IrqReady::new();
    let mut owner_stack = Stack::<1024>::new();
    let mut waiter_stack = Stack::<1024>::new();
    let mutex = Mutex::new(());
    let outcome = RefCell::new(None);
    let sched: Sched<'_> = Scheduler::new(SimPort::new(1000), &IRQ);
    let sched = &sched;
    let (mutex, outcome) = (&mutex, &outcome);

    let owner = sched
        .spawn(&mut owner_stack, async move {
            let guard = mutex.lock(sched).await.unwrap();
            if task::sleep(sched, 1000).await.is_err() {
                // exit without ever unlocking
                mem::forget(guard);
            }
        })
        .unwrap();
    let waiter = sched
        .spawn(&mut waiter_stack, async move {
            let res = mutex.lock(sched).await.map(drop);
            *outcome.borrow_mut() = Some(res);
        })
        .unwrap();

    sched.run(async {
        task::r#yield(sched).await;
        assert!(sched.cancel_wait(owner));

        // the owner exits, the waiter stays blocked on a mutex nobody will unlock
        task::r#yield(sched).await;
        assert!(mutex.is_locked());
        assert_eq!(*outcome.borrow(), None);

        assert_eq!(sched.cancel_dead(), 1);
        task::join(sched, waiter).await.unwrap();
    });

    assert_eq!(*outcome.borrow(), Some(Err(Cancelled)));
}

#[cfg(feature = "dead-task-check")]
#[test]
fn dead_task_scan_runs_when_nothing_else_can() {
    static IRQ: IrqReady<4> = IrqReady::new();
    let mut stack = Stack::<1024>::new();
    let mutex = Mutex::new(());
    let outcome = RefCell::new(None);
    let sched: Sched<'_> = Scheduler::new(SimPort::new(1000), &IRQ);
    let sched = &sched;
    let (mutex, outcome) = (&mutex, &outcome);

    // a lock that is never released
    mem::forget(mutex.try_lock(sched).unwrap());

    let waiter = sched
        .spawn(&mut stack, async move {
            let res = mutex.lock(sched).await.map(drop);
            *outcome.borrow_mut() = Some(res);
        })
        .unwrap();

    sched.run(async {
        // the scan cancels our join as well; the second join finds the waiter done
        let first = task::join(sched, waiter).await;
        task::join(sched, waiter).await.unwrap();
        assert_eq!(first, Err(Cancelled));
    });

    assert_eq!(*outcome.borrow(), Some(Err(Cancelled)));
}

#[test]
fn event_wakes_every_current_waiter() {
    static IRQ: IrqReady<4> = IrqReady::new();
    let mut stacks = [Stack::<1024>::new(), Stack::new(), Stack::new()];
    let event = Event::new();
    let woken = RefCell::new(Vec::new());
    let sched: Sched<'_> = Scheduler::new(SimPort::new(1000), &IRQ);
    let sched = &sched;
    let (event, woken) = (&event, &woken);

    for (i, stack) in stacks.iter_mut().enumerate() {
        sched
            .spawn(stack, async move {
                event.wait(sched).await.unwrap();
                woken.borrow_mut().push(i);
            })
            .unwrap();
    }

    sched.run(async {
        task::r#yield(sched).await;
        assert_eq!(event.waiters(sched), 3);
        assert_eq!(event.set(sched), 3);
        // nobody is left waiting; the event does not remember this one
        assert_eq!(event.set(sched), 0);
        task::r#yield(sched).await;
    });

    assert_eq!(*woken.borrow(), [0, 1, 2]);
}

#[test]
fn event_wait_with_timeout() {
    static IRQ: IrqReady<4> = IrqReady::new();
    let mut stack = Stack::<1024>::new();
    let event = Event::new();
    let sched: Sched<'_> = Scheduler::new(SimPort::new(1000), &IRQ);
    let sched = &sched;
    let event = &event;

    sched.run(async {
        assert_eq!(event.wait_timeout(sched, 50).await, Ok(false));
        assert_eq!(sched.now(), 50);

        sched
            .spawn(&mut stack, async move {
                task::sleep(sched, 10).await.unwrap();
                assert_eq!(event.set(sched), 1);
            })
            .unwrap();

        assert_eq!(event.wait_ms(sched, 100).await, Ok(true));
        assert_eq!(sched.now(), 60);
        assert_eq!(event.waiters(sched), 0);
    });
}

#[test]
fn recycled_wait_lists_do_not_alias() {
    static IRQ: IrqReady<4> = IrqReady::new();
    // enough reuses of one list head to run a 16-bit counter all the way around
    const CYCLES: u32 = u16::MAX as u32;

    let mut stack = Stack::<1024>::new();
    let (a, b) = (Event::new(), Event::new());
    let outcome = RefCell::new(None);
    let sched: Sched<'_> = Scheduler::new(SimPort::new(1000), &IRQ);
    let sched = &sched;
    let (a, b, outcome) = (&a, &b, &outcome);

    let worker = sched
        .spawn(&mut stack, async move {
            a.wait(sched).await.unwrap();
            for _ in 0..CYCLES {
                b.wait(sched).await.unwrap();
            }
            *outcome.borrow_mut() = Some(b.wait(sched).await);
        })
        .unwrap();

    sched.run(async {
        task::r#yield(sched).await;
        assert_eq!(a.set(sched), 1);
        for _ in 0..CYCLES {
            task::r#yield(sched).await;
            assert_eq!(b.set(sched), 1);
        }
        task::r#yield(sched).await;

        assert_eq!(a.waiters(sched), 0);
        assert_eq!(b.waiters(sched), 1);
        assert_eq!(a.set(sched), 0);
        assert_eq!(*outcome.borrow(), None);

        assert_eq!(b.set(sched), 1);
        task::join(sched, worker).await.unwrap();
    });

    assert_eq!(*outcome.borrow(), Some(Ok(())));
}

#[test]
fn cancelled_channel_transfers() {
    static IRQ: IrqReady<4> = IrqReady::new();
    let mut producer_stack = Stack::<1024>::new();
    let mut consumer_stack = Stack::<1024>::new();
    let full = Channel::<u16, 2>::new();
    let empty = Channel::<u16, 2>::new();
    let results = RefCell::new(Vec::new());
    let sched: Sched<'_> = Scheduler::new(SimPort::new(1000), &IRQ);
    let sched = &sched;
    let (full, empty, results) = (&full, &empty, &results);

    let producer = sched
        .spawn(&mut producer_stack, async move {
            let res = full.put_n(sched, &[1, 2, 3, 4, 5]).await;
            results.borrow_mut().push(("put_n", res));
            let res = full.put(sched, 6).await;
            results.borrow_mut().push(("put", res));
        })
        .unwrap();
    let consumer = sched
        .spawn(&mut consumer_stack, async move {
            let res = empty.get(sched).await.map(drop);
            results.borrow_mut().push(("get", res));
            let mut buf = [0; 3];
            let res = empty.get_n(sched, &mut buf).await;
            results.borrow_mut().push(("get_n", res));
        })
        .unwrap();

    sched.run(async {
        // twice: once for the first blocking call of each task, once for the second
        for _ in 0..2 {
            task::r#yield(sched).await;
            assert!(sched.cancel_wait(producer));
            assert!(sched.cancel_wait(consumer));
        }
        task::join(sched, producer).await.unwrap();
        task::join(sched, consumer).await.unwrap();
    });

    assert_eq!(
        *results.borrow(),
        [
            ("put_n", Err(Cancelled)),
            ("get", Err(Cancelled)),
            ("put", Err(Cancelled)),
            ("get_n", Err(Cancelled)),
        ]
    );
    // the part of `put_n` that fit is there exactly once
    assert_eq!(full.try_get(sched), Some(1));
    assert_eq!(full.try_get(sched), Some(2));
    assert_eq!(full.try_get(sched), None);
    assert!(empty.is_empty());
}
