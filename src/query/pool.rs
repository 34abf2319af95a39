//! Fixed-size scatter-gather pool.

use std::sync::mpsc;
use std::sync::Mutex;
use std::thread;

use crate::{Error, Result};

/// Run `work` once per task on `workers` threads and return every result.
///
/// The task queue and the result queue are both sized to the task count, so
/// no worker ever blocks on them. Results come back only after every worker
/// has been joined; their order is completion order.
pub fn fan_out<T, R, F>(tasks: Vec<T>, workers: usize, work: F) -> Result<Vec<R>>
where
    T: Send,
    R: Send,
    F: Fn(T) -> R + Sync,
{
    if tasks.is_empty() {
        return Ok(Vec::new());
    }
    let workers = workers.clamp(1, tasks.len());
    let capacity = tasks.len();

    let (task_tx, task_rx) = mpsc::sync_channel::<T>(capacity);
    for task in tasks {
        task_tx
            .send(task)
            .map_err(|_| Error::WorkerPanicked)?;
    }
    drop(task_tx);
    let task_rx = Mutex::new(task_rx);
    let (result_tx, result_rx) = mpsc::sync_channel::<R>(capacity);

    thread::scope(|scope| -> Result<Vec<R>> {
        let mut handles = Vec::with_capacity(workers);
        for worker_id in 0..workers {
            let task_rx = &task_rx;
            let work = &work;
            let result_tx = result_tx.clone();
            let handle = thread::Builder::new()
                .name(format!("count-worker-{worker_id}"))
                .spawn_scoped(scope, move || loop {
                    let next = match task_rx.lock() {
                        Ok(rx) => rx.recv(),
                        Err(_) => break,
                    };
                    let Ok(task) = next else {
                        break;
                    };
                    if result_tx.send(work(task)).is_err() {
                        break;
                    }
                })?;
            handles.push(handle);
        }
        drop(result_tx);

        let mut panicked = false;
        for handle in handles {
            panicked |= handle.join().is_err();
        }
        if panicked {
            return Err(Error::WorkerPanicked);
        }
        Ok(result_rx.try_iter().collect())
    })
}
