//! End-to-end behavior of the iteration protocol under the concurrency
//! limiter: slot accounting, nested bypass, step ordering, and the
//! synchronous/asynchronous boundary.

use std::cell::RefCell;
use std::rc::Rc;

use coroflow::prelude::*;
use coroflow::{limit::reset, Limit, Semaphore};

fn limited_flow(capacity: usize) -> (Flow<Limit<Substrate>>, Semaphore) {
    reset();
    let m = limit(capacity).unwrap();
    let sem = m.semaphore();
    (Flow::new(Substrate.with(m).unwrap()), sem)
}

/// Body that records its first segment, yields once, then completes.
fn two_segment_body(
    name: &'static str,
    starts: Rc<RefCell<Vec<&'static str>>>,
) -> impl Body<Yield = &'static str, Return = &'static str> {
    let mut first = true;
    from_fn(move |_cx, signal: Signal| {
        signal.propagate()?;
        if first {
            first = false;
            starts.borrow_mut().push(name);
            Ok(Step::Yielded(name))
        } else {
            Ok(Step::Complete(name))
        }
    })
}

#[test]
fn capacity_two_admits_two_segments_then_one_more_per_release() {
    let (flow, sem) = limited_flow(2);
    let starts = Rc::new(RefCell::new(Vec::new()));

    let a = flow.iterate(two_segment_body("a", Rc::clone(&starts)));
    let b = flow.iterate(two_segment_body("b", Rc::clone(&starts)));
    let c = flow.iterate(two_segment_body("c", Rc::clone(&starts)));

    flow.run(|| {
        a.next().fire();
        b.next().fire();
        c.next().fire();

        // Exactly the first two began their first synchronous segment.
        assert_eq!(&*starts.borrow(), &["a", "b"]);
        assert_eq!(sem.available(), 0);
        assert_eq!(sem.queued(), 1);

        // Completing `a` releases its slot, which is handed to `c`.
        a.next().fire();
        assert_eq!(&*starts.borrow(), &["a", "b", "c"]);
        assert_eq!(sem.queued(), 0);
    });

    assert_eq!(a.status(), Status::Done);
    assert_eq!(b.status(), Status::Suspended);
    assert_eq!(c.status(), Status::Suspended);
    reset();
}

#[test]
fn nested_limited_call_bypasses_the_semaphore_at_capacity_one() {
    let (flow, sem) = limited_flow(1);
    let log = Rc::new(RefCell::new(Vec::new()));

    let body_log = Rc::clone(&log);
    let nested_flow = flow.clone();
    let outer = flow.iterate(from_fn(move |_cx, signal: Signal| {
        signal.propagate()?;
        body_log.borrow_mut().push("outer segment");

        // A nested limited call while the outer coroutine holds the only
        // slot: it must run immediately, not queue.
        let sub_log = Rc::clone(&body_log);
        let sub = nested_flow.iterate(from_fn(move |_cx, signal: Signal| {
            signal.propagate()?;
            sub_log.borrow_mut().push("inner segment");
            Ok(Step::Complete::<(), i32>(7))
        }));
        let sub_out = Rc::clone(&body_log);
        sub.next().call(move |out| {
            assert_eq!(out.unwrap(), Step::Complete(7));
            sub_out.borrow_mut().push("inner delivered");
        });

        body_log.borrow_mut().push("outer segment end");
        Ok(Step::Complete::<(), &str>("outer done"))
    }));

    flow.run(|| {
        let log = Rc::clone(&log);
        outer.next().call(move |out| {
            assert_eq!(out.unwrap(), Step::Complete("outer done"));
            log.borrow_mut().push("outer delivered");
        });
    });

    // The inner segment ran inside the outer one; deliveries followed later.
    assert_eq!(
        &*log.borrow(),
        &[
            "outer segment",
            "inner segment",
            "outer segment end",
            "inner delivered",
            "outer delivered",
        ]
    );
    assert_eq!(sem.available(), 1);
    reset();
}

#[test]
fn next_steps_through_yields_completion_and_exhaustion() {
    let (flow, _sem) = limited_flow(4);
    let iter = flow.iterate(emit(vec![111, 222, 333], "done"));
    let log = Rc::new(RefCell::new(Vec::new()));

    flow.run(|| {
        for _ in 0..5 {
            let log = Rc::clone(&log);
            iter.next().call(move |out| {
                log.borrow_mut().push(match out {
                    Ok(Step::Yielded(v)) => format!("yield {v}"),
                    Ok(Step::Complete(r)) => format!("done {r}"),
                    Err(e) if e.is_exhausted() => "exhausted".to_string(),
                    Err(e) => format!("error {e}"),
                });
            });
        }
    });

    assert_eq!(
        &*log.borrow(),
        &["yield 111", "yield 222", "yield 333", "done done", "exhausted"]
    );
    reset();
}

#[test]
fn for_each_visits_yields_in_order_before_the_final_outcome() {
    let (flow, _sem) = limited_flow(1);
    let iter = flow.iterate(emit(vec![111, 222, 333], "done"));
    let log = Rc::new(RefCell::new(Vec::new()));

    flow.run(|| {
        let visited = Rc::clone(&log);
        let finished = Rc::clone(&log);
        iter.for_each(move |v| visited.borrow_mut().push(v.to_string()))
            .call(move |out| finished.borrow_mut().push(format!("final {}", out.unwrap())));
    });

    assert_eq!(&*log.borrow(), &["111", "222", "333", "final done"]);
    reset();
}

#[derive(Debug)]
struct Collapse;

impl std::fmt::Display for Collapse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "collapse")
    }
}

impl std::error::Error for Collapse {}

#[test]
fn raise_after_one_yield_then_exhaustion() {
    let (flow, sem) = limited_flow(1);
    let mut segments = 0;
    let iter = flow.iterate(from_fn(move |_cx, signal: Signal| {
        signal.propagate()?;
        segments += 1;
        if segments == 1 {
            Ok(Step::Yielded(segments))
        } else {
            Err(Box::new(Collapse) as BodyError)
        }
    }));

    let log = Rc::new(RefCell::new(Vec::new()));
    flow.run(|| {
        for _ in 0..3 {
            let log = Rc::clone(&log);
            iter.next().call(move |out: IterStep| {
                log.borrow_mut().push(match out {
                    Ok(step) => format!("{step:?}"),
                    Err(Error::Body(e)) => {
                        // Propagated verbatim: still the original type.
                        assert!(e.downcast_ref::<Collapse>().is_some());
                        "raised".to_string()
                    }
                    Err(e) if e.is_exhausted() => "exhausted".to_string(),
                    Err(e) => format!("{e}"),
                });
            });
        }
    });

    assert_eq!(&*log.borrow(), &["Yielded(1)", "raised", "exhausted"]);
    assert_eq!(iter.status(), Status::Failed);
    // The failed coroutine's slot was still freed.
    assert_eq!(sem.available(), 1);
    reset();
}

type IterStep = coroflow::IterOutcome<i32, ()>;

#[test]
#[should_panic(expected = "driven again before the prior resume step completed")]
fn redriving_a_parked_iterator_fails_fast() {
    let (flow, _sem) = limited_flow(1);
    let a = flow.iterate(emit(vec![1], ()));
    let b = flow.iterate(emit(vec![1], ()));

    flow.run(|| {
        a.next().fire(); // takes the only slot
        b.next().fire(); // parks in the limiter queue
        b.next().fire(); // prior step still in flight
    });
}

#[test]
fn side_effects_split_cleanly_at_the_suspension_point() {
    let (flow, _sem) = limited_flow(1);
    let log = Rc::new(RefCell::new(Vec::new()));

    let body_log = Rc::clone(&log);
    let mut segments = 0;
    let iter = flow.iterate(from_fn(move |_cx, signal: Signal| {
        signal.propagate()?;
        segments += 1;
        if segments == 1 {
            body_log.borrow_mut().push("pre-suspension");
            Ok(Step::Yielded(()))
        } else {
            body_log.borrow_mut().push("post-suspension");
            Ok(Step::Complete(()))
        }
    }));

    flow.run(|| {
        {
            let log = Rc::clone(&log);
            iter.next().call(move |_| log.borrow_mut().push("first delivered"));
        }
        // Work up to the first suspension point already happened; its
        // delivery has not.
        log.borrow_mut().push("first invocation returned");

        {
            let log = Rc::clone(&log);
            iter.next().call(move |_| log.borrow_mut().push("second delivered"));
        }
        log.borrow_mut().push("second invocation returned");
    });

    assert_eq!(
        &*log.borrow(),
        &[
            "pre-suspension",
            "first invocation returned",
            "post-suspension",
            "second invocation returned",
            "first delivered",
            "second delivered",
        ]
    );
    reset();
}

#[test]
fn wrapped_invocation_styles_bind_identical_contexts() {
    let (flow, _sem) = limited_flow(2);
    let wrapped = flow.wrap(|prefix: &'static str| {
        from_fn(move |cx: &mut Context, signal: Signal| {
            signal.propagate()?;
            let caller = cx
                .get("caller")
                .and_then(|v| v.as_str())
                .unwrap_or("ambient")
                .to_string();
            Ok(Step::Complete::<(), String>(format!("{prefix}:{caller}")))
        })
    });

    let seen = Rc::new(RefCell::new(Vec::new()));
    flow.run(|| {
        let log = Rc::clone(&seen);
        wrapped.call("r").next().call(move |out| {
            log.borrow_mut().push(out.unwrap().unwrap_complete());
        });

        let mut cx = Context::new();
        cx.insert("caller", "explicit");
        let log = Rc::clone(&seen);
        wrapped.call_in(cx, "r").next().call(move |out| {
            log.borrow_mut().push(out.unwrap().unwrap_complete());
        });
    });

    assert_eq!(&*seen.borrow(), &["r:ambient", "r:explicit"]);
    reset();
}
