//! Machines in different contexts talking through handles and workers.

use spindle_core::prelude::*;
use std::sync::Arc;
use std::time::Duration;

const SRC_PEER: Src = 1;
const SRC_WORKER: Src = 2;
const BALL: EventType = 1;
const SETTLED: EventType = 2;

/// Returns the ball until the rally runs out, then asks its worker to
/// confirm from outside the context.
struct Player {
    peer: Option<FsmHandle>,
    hits: u32,
    limit: u32,
    report: flume::Sender<(&'static str, u32)>,
    name: &'static str,
}

impl StateMachine for Player {
    fn handle(&mut self, cx: &mut FsmCx<'_>, ev: FsmEvent) {
        match (ev.src, ev.kind) {
            (ACTION, START) => {}
            (SRC_PEER, BALL) | (ACTION, BALL) => {
                self.hits += 1;
                if self.hits < self.limit {
                    let peer = self.peer.clone().expect("peer is wired before play");
                    cx.raise_to(&peer, BALL);
                } else {
                    let worker = cx.context().worker().cloned().expect("context has a worker");
                    worker.post(cx.handle(SRC_WORKER), SETTLED).unwrap();
                }
            }
            (SRC_WORKER, SETTLED) => {
                self.report.send((self.name, self.hits)).unwrap();
            }
            _ => bad_source(self.name(), self.hits, ev),
        }
    }

    fn shutdown(&mut self, cx: &mut FsmCx<'_>, _ev: FsmEvent) {
        cx.stopped_noevent();
    }

    fn name(&self) -> &'static str {
        "player"
    }
}

fn player(
    ctx: &Arc<Context>,
    name: &'static str,
    limit: u32,
    report: &flume::Sender<(&'static str, u32)>,
) -> FsmId {
    let mut cx = ctx.enter();
    let id = cx.insert_root(Player {
        peer: None,
        hits: 0,
        limit,
        report: report.clone(),
        name,
    });
    cx.start(id);
    id
}

fn wire(ctx: &Arc<Context>, id: FsmId, peer: FsmHandle) {
    ctx.enter()
        .with::<Player, _>(id, |p, _| p.peer = Some(peer));
}

#[test]
fn test_rally_between_contexts() {
    let pool = WorkerPool::new(PoolConfig::default().with_threads(2)).unwrap();
    let (tx, rx) = flume::unbounded();
    let left_ctx = pool.context();
    let right_ctx = pool.context();
    let left = player(&left_ctx, "left", 1000, &tx);
    let right = player(&right_ctx, "right", 20, &tx);
    wire(&left_ctx, left, FsmHandle::new(Arc::clone(&right_ctx), right, SRC_PEER));
    wire(&right_ctx, right, FsmHandle::new(Arc::clone(&left_ctx), left, SRC_PEER));

    left_ctx.feed(left, FsmEvent::action(BALL));

    let (name, hits) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!((name, hits), ("right", 20));
    assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());

    let mut cx = left_ctx.enter();
    assert_eq!(cx.with::<Player, _>(left, |p, _| p.hits), 20);
    cx.stop(left);
    assert!(cx.is_idle(left));
}

#[test]
fn test_worker_completion_arrives_after_leave() {
    let pool = WorkerPool::new(PoolConfig::default().with_threads(1)).unwrap();
    let (tx, rx) = flume::unbounded();
    let ctx = pool.context();
    let solo = player(&ctx, "solo", 1, &tx);

    {
        let mut cx = ctx.enter();
        cx.feed(solo, FsmEvent::action(BALL));
        // The worker cannot get in while the context is held.
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    }
    assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), ("solo", 1));
}
