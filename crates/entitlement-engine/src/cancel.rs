//! 可派生的取消令牌
//!
//! 父令牌取消时级联取消所有子令牌，子令牌取消不影响父令牌。
//! 每个令牌持有一个 watch 通道，等待方通过订阅感知取消。

use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tokio::sync::watch;

#[derive(Debug)]
struct Node {
    tx: watch::Sender<bool>,
    children: Mutex<Vec<Weak<Node>>>,
}

impl Node {
    fn new(cancelled: bool) -> Arc<Self> {
        let (tx, _rx) = watch::channel(cancelled);
        Arc::new(Self {
            tx,
            children: Mutex::new(Vec::new()),
        })
    }

    fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    fn cancel(&self) {
        // 先置位再摘取子节点，保证并发派生的子令牌不会漏掉
        if self.tx.send_replace(true) {
            return;
        }
        let children = std::mem::take(&mut *self.children.lock());
        for child in children {
            if let Some(child) = child.upgrade() {
                child.cancel();
            }
        }
    }
}

/// 取消令牌
#[derive(Debug, Clone)]
pub struct CancellationToken {
    node: Arc<Node>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self {
            node: Node::new(false),
        }
    }

    /// 派生子令牌；父令牌已取消时子令牌创建即为已取消
    pub fn child_token(&self) -> Self {
        let mut children = self.node.children.lock();
        if self.node.is_cancelled() {
            return Self {
                node: Node::new(true),
            };
        }
        let child = Node::new(false);
        children.retain(|c| c.strong_count() > 0);
        children.push(Arc::downgrade(&child));
        Self { node: child }
    }

    pub fn cancel(&self) {
        self.node.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.node.is_cancelled()
    }

    /// 等待取消
    pub async fn cancelled(&self) {
        let mut rx = self.node.tx.subscribe();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}
