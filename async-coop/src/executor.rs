use core::{
    cell::{Cell, RefCell},
    fmt,
    future::Future,
    mem,
    pin::Pin,
    ptr::{self, NonNull},
    task::{Context, Poll},
};

use pin_utils::pin_mut;

use crate::{
    error::{Fatal, SpawnError},
    irq::IrqReady,
    list::{ListId, Lists, WaitKey, WaitList},
    port::Port,
    stack::{Region, Stack},
    time::Ticks,
    timer::TimerIndex,
};

/// Handle to a task
///
/// Slots are reused once a task has closed; the generation tells incarnations apart, so a
/// handle to a finished task keeps reporting it as closed.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct TaskId {
    index: u16,
    generation: u16,
}

impl TaskId {
    /// The task driven by `Scheduler::run`
    pub const MAIN: TaskId = TaskId {
        index: 0,
        generation: 0,
    };

    pub(crate) const fn new(index: usize, generation: u16) -> Self {
        Self {
            index: index as u16,
            generation,
        }
    }

    /// Slot of the task in the scheduler
    pub fn index(&self) -> usize {
        usize::from(self.index)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.index)?;
        if self.generation != 0 {
            write!(f, ".{}", self.generation)?;
        }
        Ok(())
    }
}

/// Why a blocked task was made ready again
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Wakeup {
    /// The object it waited on was signalled (or, for a mutex, handed over)
    Signaled,
    /// Its timer expired
    TimedOut,
    /// `cancel_wait` or the dead-task scan
    Cancelled,
    /// An interrupt handler woke it
    Interrupt,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum State {
    Free,
    Ready,
    Running,
    Blocked,
    Closed,
}

#[derive(Clone, Copy)]
struct Tcb {
    state: State,
    generation: u16,
    wakeup: Option<Wakeup>,
}

impl Tcb {
    const FREE: Tcb = Tcb {
        state: State::Free,
        generation: 0,
        wakeup: None,
    };
}

/// Queue and timer bookkeeping; borrowed only for short, non-reentrant updates
struct Kernel<T, const N: usize> {
    tasks: [Tcb; N],
    lists: Lists<N>,
    timers: T,
    current: usize,
}

fn make_ready<const N: usize>(
    tasks: &mut [Tcb; N],
    lists: &mut Lists<N>,
    task: usize,
    why: Wakeup,
) {
    tasks[task].wakeup = Some(why);
    tasks[task].state = State::Ready;
    lists.attach(ListId::Ready, task);
}

impl<T, const N: usize> Kernel<T, N>
where
    T: TimerIndex,
{
    fn live(&self, task: TaskId) -> Option<usize> {
        let index = task.index();
        (index < N && self.tasks[index].generation == task.generation).then_some(index)
    }

    fn id(&self, index: usize) -> TaskId {
        TaskId::new(index, self.tasks[index].generation)
    }

    /// Moves a blocked task to the ready queue, dropping its wait list and timer membership
    fn wake(&mut self, task: usize, why: Wakeup) -> bool {
        if self.tasks[task].state != State::Blocked {
            return false;
        }
        self.lists.detach(task);
        self.timers.remove(task);
        make_ready(&mut self.tasks, &mut self.lists, task, why);
        true
    }

    fn expire(&mut self, now: Ticks) -> usize {
        let Kernel {
            tasks,
            lists,
            timers,
            ..
        } = self;
        timers.run_due(now, &mut |task| {
            if tasks[task].state == State::Blocked {
                log::trace!("T{} timer expired", task);
                lists.detach(task);
                make_ready(tasks, lists, task, Wakeup::TimedOut);
            }
        })
    }

    /// Interrupt wake-ups only apply to tasks parked outside of any wait list
    ///
    /// The timer entry stays: a sleeper that goes back to sleep keeps its place among equal
    /// deadlines, and the entry is dropped or re-armed when the task next runs.
    fn wake_from_irq(&mut self, task: usize) -> bool {
        if self.tasks[task].state != State::Blocked || self.lists.owner(task).is_some() {
            return false;
        }
        make_ready(&mut self.tasks, &mut self.lists, task, Wakeup::Interrupt);
        true
    }

    fn block(&mut self, task: usize) {
        self.tasks[task].state = State::Blocked;
        self.tasks[task].wakeup = None;
    }

    fn wait_on(&mut self, task: usize, list: &WaitList) -> Result<(), Fatal> {
        let key = match list.key() {
            Some(key) if self.lists.is_live(key) => key,
            _ => {
                let key = self.lists.alloc().ok_or(Fatal::WaitListExhausted)?;
                list.set_key(key);
                key
            }
        };
        if self.lists.owner(task) != Some(ListId::Wait(key)) {
            self.lists.attach(ListId::Wait(key), task);
        }
        self.block(task);
        Ok(())
    }

    fn live_key(&self, list: &WaitList) -> Option<WaitKey> {
        list.key().filter(|&key| self.lists.is_live(key))
    }

    fn signal_one(&mut self, key: WaitKey) -> Option<usize> {
        let task = self.lists.front(ListId::Wait(key))?;
        if !self.wake(task, Wakeup::Signaled) {
            self.lists.detach(task);
        }
        Some(task)
    }

    /// Cancels every task blocked on a mutex, event or join list
    fn cancel_dead(&mut self) -> usize {
        let keys = self.lists.live_waits().collect::<heapless::Vec<_, N>>();
        let mut cancelled = 0;
        for key in keys {
            while let Some(task) = self.lists.front(ListId::Wait(key)) {
                if !self.wake(task, Wakeup::Cancelled) {
                    self.lists.detach(task);
                }
                log::warn!("{} cancelled: nothing can release what it waits for", self.id(task));
                cancelled += 1;
            }
        }
        cancelled
    }

    /// Are there tasks only an interrupt can wake up?
    fn has_parked(&self) -> bool {
        self.tasks.iter().enumerate().any(|(index, tcb)| {
            tcb.state == State::Blocked
                && self.lists.owner(index).is_none()
                && !self.timers.contains(index)
        })
    }
}

struct Slot<'a> {
    future: Cell<Option<NonNull<dyn Future<Output = ()> + 'a>>>,
    stack: Cell<Option<Region>>,
    join: WaitList,
}

impl Slot<'_> {
    fn new() -> Self {
        Self {
            future: Cell::new(None),
            stack: Cell::new(None),
            join: WaitList::new(),
        }
    }
}

/// A single-threaded cooperative scheduler for up to `N` tasks, the main task included
///
/// Tasks are futures stored in caller-provided `Stack`s; `T` selects the timer index. The
/// scheduler is `!Sync`: it is meant to be shared by reference between the tasks it runs,
/// which also pass it to every blocking primitive.
pub struct Scheduler<'a, P, T, const N: usize>
where
    P: Port,
    T: TimerIndex,
{
    port: P,
    irq: &'static IrqReady<N>,
    kernel: RefCell<Kernel<T, N>>,
    slots: [Slot<'a>; N],
    in_run: Cell<bool>,
}

impl<'a, P, T, const N: usize> Scheduler<'a, P, T, N>
where
    P: Port,
    T: TimerIndex + Default,
{
    /// Creates a scheduler; `irq` is where interrupt handlers mark tasks as woken
    pub fn new(port: P, irq: &'static IrqReady<N>) -> Self {
        assert!(N > 0, "no slot for the main task");
        Self {
            port,
            irq,
            kernel: RefCell::new(Kernel {
                tasks: [Tcb::FREE; N],
                lists: Lists::new(),
                timers: T::default(),
                current: 0,
            }),
            slots: core::array::from_fn(|_| Slot::new()),
            in_run: Cell::new(false),
        }
    }
}

impl<'a, P, T, const N: usize> Scheduler<'a, P, T, N>
where
    P: Port,
    T: TimerIndex,
{
    /// Moves `task` into `stack` and appends it to the ready queue
    ///
    /// The task does not run until the current task suspends (or `run` is called).
    pub fn spawn<F, const LEN: usize>(
        &self,
        stack: &'a mut Stack<LEN>,
        task: F,
    ) -> Result<TaskId, SpawnError>
    where
        F: Future<Output = ()> + 'a,
    {
        let mut kernel = self.kernel.borrow_mut();
        let index = (1..N)
            .find(|&i| matches!(kernel.tasks[i].state, State::Free | State::Closed))
            .ok_or(SpawnError::TooManyTasks)?;

        let base = NonNull::from(stack).cast::<u8>();
        // NOTE(unsafe) `stack` is borrowed for `'a`, as long as this scheduler can run the task;
        // `Stack` is 8-byte aligned and the buffer is its only field
        let (region, future) = unsafe { Region::init(base, LEN, task)? };
        let slot = &self.slots[index];
        slot.future.set(Some(future));
        slot.stack.set(Some(region));

        let tcb = &mut kernel.tasks[index];
        if tcb.state == State::Closed {
            tcb.generation = tcb.generation.wrapping_add(1);
        }
        tcb.state = State::Ready;
        tcb.wakeup = None;
        kernel.lists.attach(ListId::Ready, index);

        let id = kernel.id(index);
        log::debug!("{} spawned, {} of {} stack bytes free", id, region.free(), LEN);
        Ok(id)
    }

    /// Drives `main` to completion, running the spawned tasks whenever it suspends
    ///
    /// When `main` completes the tasks that are still alive are dropped.
    pub fn run<F>(&self, main: F) -> F::Output
    where
        F: Future,
    {
        // we want to avoid reentering `run`: a task polling the scheduler that is polling it
        if self.in_run.replace(true) {
            self.fatal(Fatal::NestedRun);
        }

        pin_mut!(main);
        self.port.init();
        {
            let mut kernel = self.kernel.borrow_mut();
            kernel.tasks[0].state = State::Running;
            kernel.tasks[0].wakeup = None;
            kernel.current = 0;
        }

        let val = loop {
            let task = self.kernel.borrow().current;
            let waker = self.irq.waker(task);
            let mut cx = Context::from_waker(&waker);

            if task == 0 {
                if let Poll::Ready(val) = main.as_mut().poll(&mut cx) {
                    break val;
                }
            } else {
                self.poll_task(task, &mut cx);
            }

            self.suspend(task);
            self.run_next();
        };

        self.close(0);
        for task in 1..N {
            if self.kernel.borrow().tasks[task].state != State::Closed
                && self.slots[task].future.get().is_some()
            {
                self.close(task);
            }
        }
        self.in_run.set(false);
        val
    }

    /// Runs ready tasks until none is left, without ever idling
    ///
    /// For embedding into a host event loop. Returns the ticks until the next timer expires,
    /// or `None` if no timer is pending.
    pub fn run_pending(&self) -> Option<Ticks> {
        if self.in_run.replace(true) {
            self.fatal(Fatal::NestedRun);
        }

        loop {
            let now = self.port.now();
            let next = {
                let mut kernel = self.kernel.borrow_mut();
                self.irq.drain(|task| {
                    kernel.wake_from_irq(task);
                });
                kernel.expire(now);
                let next = kernel.lists.pop_front(ListId::Ready);
                if let Some(task) = next {
                    kernel.tasks[task].state = State::Running;
                    kernel.current = task;
                }
                next
            };
            let Some(task) = next else { break };

            self.check_stack(task);
            let waker = self.irq.waker(task);
            self.poll_task(task, &mut Context::from_waker(&waker));
            self.suspend(task);
        }

        self.in_run.set(false);
        self.kernel
            .borrow()
            .timers
            .time_until_next(self.port.now())
    }

    /// Picks the next task to poll; idles while nothing is ready
    fn run_next(&self) {
        loop {
            let now = self.port.now();
            let mut kernel = self.kernel.borrow_mut();

            // interrupt wake-ups go first
            self.irq.drain(|task| {
                if kernel.wake_from_irq(task) {
                    log::trace!("T{} woken by an interrupt", task);
                }
            });
            kernel.expire(now);

            if let Some(next) = kernel.lists.pop_front(ListId::Ready) {
                let prev = mem::replace(&mut kernel.current, next);
                kernel.tasks[next].state = State::Running;
                drop(kernel);

                if prev != next {
                    log::trace!("switch T{} -> T{}", prev, next);
                }
                self.check_stack(next);
                return;
            }

            if let Some(ticks) = kernel.timers.time_until_next(now) {
                drop(kernel);
                self.port.idle(Some(ticks));
                continue;
            }

            // while an interrupt can still wake someone up, nobody is provably stuck
            if kernel.has_parked() || self.irq.is_pending() {
                drop(kernel);
                self.port.idle(None);
                continue;
            }

            if cfg!(feature = "dead-task-check") && kernel.cancel_dead() != 0 {
                continue;
            }
            drop(kernel);

            // nothing is runnable and nothing can become runnable
            self.fatal(Fatal::Deadlock);
        }
    }

    fn poll_task(&self, task: usize, cx: &mut Context<'_>) {
        let Some(future) = self.slots[task].future.get() else {
            return;
        };
        // NOTE(unsafe) the future was moved into its stack by `spawn` and never moves again;
        // only this method polls it and it is dropped in place, once, by `close`
        let done = unsafe { Pin::new_unchecked(&mut *future.as_ptr()) }
            .poll(cx)
            .is_ready();
        if done {
            self.close(task);
        }
    }

    /// A task that returned `Pending` without blocking anywhere waits for an interrupt
    fn suspend(&self, task: usize) {
        let mut kernel = self.kernel.borrow_mut();
        if kernel.tasks[task].state == State::Running {
            kernel.tasks[task].state = State::Blocked;
            kernel.tasks[task].wakeup = None;
        }
    }

    /// Marks a task closed, drops its future and signals its joiners
    fn close(&self, task: usize) {
        let id = {
            let mut kernel = self.kernel.borrow_mut();
            kernel.lists.detach(task);
            kernel.timers.remove(task);
            kernel.tasks[task].state = State::Closed;
            kernel.id(task)
        };

        if let Some(future) = self.slots[task].future.take() {
            // NOTE(unsafe) taken out of the slot first, so this runs at most once; the kernel
            // is not borrowed, destructors may use the scheduler
            unsafe { ptr::drop_in_place(future.as_ptr()) }
        }
        self.kernel.borrow_mut().tasks[task].wakeup = None;

        log::debug!("{} closed", id);
        Runtime::wake_all(self, &self.slots[task].join);
    }

    fn check_stack(&self, task: usize) {
        if !cfg!(feature = "stack-debug") {
            return;
        }
        if let Some(region) = self.slots[task].stack.get() {
            if let Err(end) = region.check() {
                let task = self.kernel.borrow().id(task);
                self.fatal(Fatal::StackCorrupted { task, end });
            }
        }
    }

    fn fatal(&self, error: Fatal) -> ! {
        log::error!("{}", error);
        self.port.fatal(&error)
    }

    /// The task being polled
    pub fn current(&self) -> TaskId {
        let kernel = self.kernel.borrow();
        kernel.id(kernel.current)
    }

    /// Current tick count of the port clock
    pub fn now(&self) -> Ticks {
        self.port.now()
    }

    /// The platform port
    pub fn port(&self) -> &P {
        &self.port
    }

    /// Forces a blocked task out of its wait, which then reports `Cancelled`
    ///
    /// Returns `false`, and does nothing, if the task was not blocked.
    pub fn cancel_wait(&self, task: TaskId) -> bool {
        let mut kernel = self.kernel.borrow_mut();
        match kernel.live(task) {
            Some(index) => kernel.wake(index, Wakeup::Cancelled),
            None => false,
        }
    }

    /// Terminates a task that is not the current one
    ///
    /// The task leaves its queue and its timer entry, its future is dropped in place and its
    /// joiners are woken. The main task cannot be killed.
    pub fn kill(&self, task: TaskId) -> bool {
        let index = {
            let kernel = self.kernel.borrow();
            match kernel.live(task) {
                Some(index)
                    if index != 0
                        && index != kernel.current
                        && matches!(kernel.tasks[index].state, State::Ready | State::Blocked) =>
                {
                    index
                }
                _ => return false,
            }
        };
        log::debug!("{} killed", task);
        self.close(index);
        true
    }

    /// Cancels every task blocked on a mutex, event or join list
    ///
    /// With the `dead-task-check` feature the scheduler runs this on its own once no task is
    /// ready, no timer is pending and no task waits for an interrupt: at that point nothing can
    /// release those tasks anymore. Returns the number of cancelled tasks.
    pub fn cancel_dead(&self) -> usize {
        self.kernel.borrow_mut().cancel_dead()
    }

    /// Bytes of the task's stack left over once its future was placed, `None` for the main task
    ///
    /// Measured from the paint at spawn. A future never grows and nothing else runs on the task
    /// stack, so the value stays the same for the life of the task; it is not a high-water mark
    /// of what polling used (that lives on the scheduler's own stack).
    pub fn stack_free(&self, task: TaskId) -> Option<usize> {
        let kernel = self.kernel.borrow();
        let index = kernel.live(task)?;
        self.slots[index].stack.get().map(|region| region.free())
    }

    /// Logs the pending timers, earliest first
    pub fn dump_timers(&self) {
        let kernel = self.kernel.borrow();
        let now = self.port.now();
        kernel.timers.for_each(&mut |task, deadline| {
            log::debug!("T{} wakes at {} ({} ticks)", task, deadline, deadline.wrapping_sub(now));
        });
    }
}

/// Scheduler services used by the blocking primitives
///
/// Every blocking operation of this crate takes a `&impl Runtime`, in practice a `&Scheduler`.
/// A primitive typically takes `current()`, parks it with `block` or `wait_on`, returns
/// `Pending` and, once polled again, learns from `take_wakeup` why it was made ready.
pub trait Runtime {
    /// Current tick count
    fn now(&self) -> Ticks;

    /// Ticks per second of the clock
    fn ticks_per_sec(&self) -> u32;

    /// The task being polled
    fn current(&self) -> TaskId;

    /// Blocks `task` outside of any wait list, until its timer, an interrupt or a cancellation
    fn block(&self, task: TaskId);

    /// Blocks `task` at the tail of `list`
    fn wait_on(&self, task: TaskId, list: &WaitList);

    /// (Re)arms the single timer of `task`
    ///
    /// An entry that already carries `deadline` is left where it is, behind the equal deadlines
    /// armed before it.
    fn arm_timer(&self, task: TaskId, deadline: Ticks);

    /// Removes the timer of `task`, if any
    fn disarm_timer(&self, task: TaskId);

    /// Why `task` was last made ready; consumes the answer
    fn take_wakeup(&self, task: TaskId) -> Option<Wakeup>;

    /// Is `task` still linked into `list`?
    fn is_waiting_on(&self, task: TaskId, list: &WaitList) -> bool;

    /// Takes `task` off the wait list it is blocked on
    fn unlink(&self, task: TaskId);

    /// Puts `task` at the tail of the ready queue
    fn requeue(&self, task: TaskId);

    /// Makes the longest waiting task of `list` ready, with `Wakeup::Signaled`
    fn wake_one(&self, list: &WaitList) -> Option<TaskId>;

    /// Makes every task of `list` ready, in list order; returns how many there were
    fn wake_all(&self, list: &WaitList) -> usize;

    /// Number of tasks on `list`
    fn waiters(&self, list: &WaitList) -> usize;

    /// See `Scheduler::cancel_wait`
    fn cancel_wait(&self, task: TaskId) -> bool;

    /// Has `task` finished (or been killed)?
    fn is_closed(&self, task: TaskId) -> bool;

    /// The list joiners of `task` wait on
    fn join_list(&self, task: TaskId) -> Option<&WaitList>;

    /// Logs `error` and invokes the port's terminal action
    fn fatal(&self, error: Fatal) -> !;
}

impl<P, T, const N: usize> Runtime for Scheduler<'_, P, T, N>
where
    P: Port,
    T: TimerIndex,
{
    fn now(&self) -> Ticks {
        self.port.now()
    }

    fn ticks_per_sec(&self) -> u32 {
        self.port.ticks_per_sec()
    }

    fn current(&self) -> TaskId {
        Scheduler::current(self)
    }

    fn block(&self, task: TaskId) {
        let mut kernel = self.kernel.borrow_mut();
        if let Some(index) = kernel.live(task) {
            kernel.block(index);
        }
    }

    fn wait_on(&self, task: TaskId, list: &WaitList) {
        let res = {
            let mut kernel = self.kernel.borrow_mut();
            match kernel.live(task) {
                Some(index) => kernel.wait_on(index, list),
                None => Ok(()),
            }
        };
        if let Err(error) = res {
            self.fatal(error);
        }
    }

    fn arm_timer(&self, task: TaskId, deadline: Ticks) {
        let inserted = {
            let mut kernel = self.kernel.borrow_mut();
            match kernel.live(task) {
                Some(index) if kernel.timers.deadline(index) == Some(deadline) => true,
                Some(index) => {
                    kernel.timers.remove(index);
                    kernel.timers.insert(index, deadline)
                }
                None => true,
            }
        };
        if !inserted {
            self.fatal(Fatal::TimerCollision(task));
        }
    }

    fn disarm_timer(&self, task: TaskId) {
        let mut kernel = self.kernel.borrow_mut();
        if let Some(index) = kernel.live(task) {
            kernel.timers.remove(index);
        }
    }

    fn take_wakeup(&self, task: TaskId) -> Option<Wakeup> {
        let mut kernel = self.kernel.borrow_mut();
        let index = kernel.live(task)?;
        kernel.tasks[index].wakeup.take()
    }

    fn is_waiting_on(&self, task: TaskId, list: &WaitList) -> bool {
        let kernel = self.kernel.borrow();
        match (kernel.live(task), kernel.live_key(list)) {
            (Some(index), Some(key)) => kernel.lists.owner(index) == Some(ListId::Wait(key)),
            _ => false,
        }
    }

    fn unlink(&self, task: TaskId) {
        let mut kernel = self.kernel.borrow_mut();
        if let Some(index) = kernel.live(task) {
            if let Some(ListId::Wait(_)) = kernel.lists.owner(index) {
                kernel.lists.detach(index);
            }
        }
    }

    fn requeue(&self, task: TaskId) {
        let mut kernel = self.kernel.borrow_mut();
        if let Some(index) = kernel.live(task) {
            let Kernel { tasks, lists, .. } = &mut *kernel;
            tasks[index].state = State::Ready;
            lists.attach(ListId::Ready, index);
        }
    }

    fn wake_one(&self, list: &WaitList) -> Option<TaskId> {
        let mut kernel = self.kernel.borrow_mut();
        let key = kernel.live_key(list)?;
        let task = kernel.signal_one(key)?;
        Some(kernel.id(task))
    }

    fn wake_all(&self, list: &WaitList) -> usize {
        let mut kernel = self.kernel.borrow_mut();
        let Some(key) = kernel.live_key(list) else {
            return 0;
        };
        let mut n = 0;
        while kernel.signal_one(key).is_some() {
            n += 1;
        }
        n
    }

    fn waiters(&self, list: &WaitList) -> usize {
        let kernel = self.kernel.borrow();
        kernel
            .live_key(list)
            .map_or(0, |key| kernel.lists.len(ListId::Wait(key)))
    }

    fn cancel_wait(&self, task: TaskId) -> bool {
        Scheduler::cancel_wait(self, task)
    }

    fn is_closed(&self, task: TaskId) -> bool {
        let kernel = self.kernel.borrow();
        match kernel.live(task) {
            Some(index) => matches!(kernel.tasks[index].state, State::Closed | State::Free),
            // the slot was reused, so this incarnation is long gone
            None => true,
        }
    }

    fn join_list(&self, task: TaskId) -> Option<&WaitList> {
        let index = self.kernel.borrow().live(task)?;
        Some(&self.slots[index].join)
    }

    fn fatal(&self, error: Fatal) -> ! {
        Scheduler::fatal(self, error)
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, vec::Vec};

    use super::*;
    use crate::{error::Cancelled, port::SimPort, task, timer::fast::Timers};

    type Sched<'a> = Scheduler<'a, SimPort, Timers<4>, 4>;

    #[test]
    fn ready_queue_is_fifo() {
        static IRQ: IrqReady<4> = IrqReady::new();
        let mut stacks = [Stack::<256>::new(), Stack::new(), Stack::new()];
        let order = RefCell::new(Vec::new());
        let sched: Sched<'_> = Scheduler::new(SimPort::new(1000), &IRQ);
        let sched = &sched;

        let [a, b, c] = &mut stacks;
        for (stack, name) in [(a, 'a'), (b, 'b'), (c, 'c')] {
            let order = &order;
            sched
                .spawn(stack, async move {
                    for round in 0..2 {
                        order.borrow_mut().push((name, round));
                        task::r#yield(sched).await;
                    }
                })
                .unwrap();
        }

        sched.run(async {
            order.borrow_mut().push(('m', 0));
            task::r#yield(sched).await;
            order.borrow_mut().push(('m', 1));
        });

        assert_eq!(
            *order.borrow(),
            [
                ('m', 0),
                ('a', 0),
                ('b', 0),
                ('c', 0),
                ('m', 1),
            ]
        );
    }

    #[test]
    fn spawn_needs_a_free_slot() {
        static IRQ: IrqReady<2> = IrqReady::new();
        let mut s1 = Stack::<64>::new();
        let mut s2 = Stack::<64>::new();
        let sched: Scheduler<'_, SimPort, Timers<2>, 2> = Scheduler::new(SimPort::new(1000), &IRQ);

        let first = sched.spawn(&mut s1, async {}).unwrap();
        assert_eq!(first.index(), 1);
        assert_eq!(sched.spawn(&mut s2, async {}), Err(SpawnError::TooManyTasks));
    }

    #[test]
    fn finished_slots_are_reused() {
        static IRQ: IrqReady<2> = IrqReady::new();
        let mut s1 = Stack::<64>::new();
        let mut s2 = Stack::<64>::new();
        let sched: Scheduler<'_, SimPort, Timers<2>, 2> = Scheduler::new(SimPort::new(1000), &IRQ);
        let sched = &sched;

        let first = sched.spawn(&mut s1, async {}).unwrap();
        sched.run(async {
            task::join(sched, first).await.unwrap();
            let second = sched.spawn(&mut s2, async {}).unwrap();
            assert_eq!(second.index(), first.index());
            assert_ne!(second, first);
            assert!(sched.is_closed(first));
            assert!(!sched.is_closed(second));
            task::join(sched, second).await.unwrap();
        });
    }

    #[test]
    fn kill_removes_the_timer_entry() {
        static IRQ: IrqReady<4> = IrqReady::new();
        let mut stack = Stack::<256>::new();
        let sched: Sched<'_> = Scheduler::new(SimPort::new(1000), &IRQ);
        let sched = &sched;

        let sleeper = sched
            .spawn(&mut stack, async move {
                let _ = task::sleep(sched, 100).await;
                unreachable!();
            })
            .unwrap();

        sched.run(async {
            task::r#yield(sched).await;
            assert!(!sched.kill(TaskId::MAIN));
            assert!(sched.kill(sleeper));
            assert!(!sched.kill(sleeper));
            assert!(sched.kernel.borrow().timers.is_empty());
            task::join(sched, sleeper).await.unwrap();
        });
    }

    #[test]
    fn stack_headroom() {
        static IRQ: IrqReady<4> = IrqReady::new();
        let mut stack = Stack::<512>::new();
        let sched: Sched<'_> = Scheduler::new(SimPort::new(1000), &IRQ);

        let sched = &sched;
        let task = sched
            .spawn(&mut stack, async move {
                let mut scratch = [0u8; 64];
                task::r#yield(sched).await;
                scratch[0] = 1;
                task::r#yield(sched).await;
                assert_eq!(scratch[0], 1);
            })
            .unwrap();
        let free = sched.stack_free(task).unwrap();
        assert!(free > 0 && free < 512 - 64);
        assert_eq!(sched.stack_free(TaskId::MAIN), None);

        sched.run(async {
            task::r#yield(sched).await;
            // polled once and still alive; the figure is fixed at spawn
            assert_eq!(sched.stack_free(task), Some(free));
            task::join(sched, task).await.unwrap();
        });
    }

    #[test]
    #[should_panic(expected = "stack sentinel")]
    fn corrupted_stack_is_fatal() {
        static IRQ: IrqReady<4> = IrqReady::new();
        let mut stack = Stack::<256>::new();
        let sched: Sched<'_> = Scheduler::new(SimPort::new(1000), &IRQ);
        let sched = &sched;

        let victim = sched.spawn(&mut stack, async {}).unwrap();
        if let Some(region) = sched.slots[victim.index()].stack.get() {
            region.corrupt(crate::error::StackEnd::Top);
        }
        sched.run(async {
            task::r#yield(sched).await;
        });
    }

    #[cfg(feature = "dead-task-check")]
    #[test]
    fn self_join_is_cancelled() {
        static IRQ: IrqReady<4> = IrqReady::new();
        let sched: Sched<'_> = Scheduler::new(SimPort::new(1000), &IRQ);
        let sched = &sched;

        // nothing can ever close the main task while it waits for itself
        sched.run(async {
            assert_eq!(task::join(sched, TaskId::MAIN).await, Err(Cancelled));
            assert!(!sched.cancel_wait(TaskId::MAIN));
        });
    }

    #[cfg(not(feature = "dead-task-check"))]
    #[test]
    #[should_panic(expected = "no runnable task")]
    fn deadlock_is_fatal() {
        static IRQ: IrqReady<4> = IrqReady::new();
        let sched: Sched<'_> = Scheduler::new(SimPort::new(1000), &IRQ);
        let sched = &sched;

        sched.run(async {
            let _ = task::join(sched, TaskId::MAIN).await;
        });
    }

    #[test]
    fn event_loop_integration() {
        static IRQ: IrqReady<4> = IrqReady::new();
        let mut stack = Stack::<256>::new();
        let ticks = RefCell::new(Vec::new());
        let sched: Sched<'_> = Scheduler::new(SimPort::new(1000), &IRQ);
        let sched = &sched;

        let ticks = &ticks;
        sched
            .spawn(&mut stack, async move {
                for _ in 0..2 {
                    task::sleep(sched, 10).await.unwrap();
                    ticks.borrow_mut().push(sched.now());
                }
            })
            .unwrap();

        assert_eq!(sched.run_pending(), Some(10));
        sched.port().advance(4);
        assert_eq!(sched.run_pending(), Some(6));
        sched.port().advance(6);
        assert_eq!(sched.run_pending(), Some(10));
        sched.port().advance(10);
        assert_eq!(sched.run_pending(), None);
        assert_eq!(*ticks.borrow(), [10, 20]);
    }
}
