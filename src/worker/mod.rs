//! 删除工作池
//!
//! 固定数量的后台任务从有界队列消费删除事件，调用存储的按用户批量删除，
//! 错误汇入单独的监听任务记录日志。请求路径只入队，真正的墓碑写入在
//! 这里异步发生。交付语义是尽力而为：失败的事件记录后即丢弃，不重试，
//! 对调用方的契约本来就只是 202 Accepted。

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::errors::ShortenerError;
use crate::storage::Storage;
use crate::storage::models::DeleteEvent;

/// 事件与错误队列的容量：突发删除不会无限阻塞请求侧，但背压仍然存在
const BUF_CH: usize = 100;

pub struct DeleteWorker {
    event_tx: mpsc::Sender<DeleteEvent>,
    err_tx: mpsc::Sender<ShortenerError>,
    workers: Vec<JoinHandle<()>>,
    listener: JoinHandle<()>,
}

impl DeleteWorker {
    pub fn new(worker_count: usize, storage: Arc<dyn Storage>) -> Self {
        let (event_tx, event_rx) = mpsc::channel::<DeleteEvent>(BUF_CH);
        let (err_tx, err_rx) = mpsc::channel::<ShortenerError>(BUF_CH);

        let listener = tokio::spawn(error_listener(err_rx));

        // 多个 worker 共享同一接收端，竞争消费
        let event_rx = Arc::new(Mutex::new(event_rx));
        let workers = (0..worker_count.max(1))
            .map(|_| {
                tokio::spawn(run_job_delete_batch(
                    event_rx.clone(),
                    storage.clone(),
                    err_tx.clone(),
                ))
            })
            .collect();

        Self {
            event_tx,
            err_tx,
            workers,
            listener,
        }
    }

    /// 有界异步入队
    ///
    /// 队列满时挂起发送任务直到腾出空间；丢弃返回的 future 即放弃该事件。
    /// 关闭后的发送被丢弃并记录。
    pub async fn send_delete_batch_request(&self, event: DeleteEvent) {
        if self.event_tx.send(event).await.is_err() {
            debug!("delete queue closed, event dropped");
        }
    }

    /// 三阶段排空关闭
    ///
    /// 关事件通道并等 worker 消费完剩余事件，再关错误通道并等监听器退出。
    /// 有序关闭不丢任何已入队的事件或错误。
    pub async fn close(self) {
        let DeleteWorker {
            event_tx,
            err_tx,
            workers,
            listener,
        } = self;

        drop(event_tx);
        for handle in workers {
            let _ = handle.await;
        }

        drop(err_tx);
        let _ = listener.await;
    }
}

async fn run_job_delete_batch(
    event_rx: Arc<Mutex<mpsc::Receiver<DeleteEvent>>>,
    storage: Arc<dyn Storage>,
    err_tx: mpsc::Sender<ShortenerError>,
) {
    loop {
        // 只在等待下一个事件时持锁，处理期间其他 worker 可以继续取活
        let event = { event_rx.lock().await.recv().await };
        let Some(event) = event else {
            break;
        };

        // 没有所有者的事件是空操作，删除始终按用户范围执行
        let Some(user_id) = event.user_id else {
            continue;
        };

        if let Err(e) = storage.delete_batch_by_user_id(user_id, &event.ids).await {
            let _ = err_tx.send(e).await;
        }
    }
}

async fn error_listener(mut err_rx: mpsc::Receiver<ShortenerError>) {
    while let Some(err) = err_rx.recv().await {
        debug!("user delete batch error: {}", err);
    }
}
