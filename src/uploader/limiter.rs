// 有界并发执行器
//
// 契约：
// - N 个独立异步任务在至多 M 个并发下执行（M >= N 全并行、M = 1 串行均无需特判）
// - 结果顺序与输入下标一致，与完成顺序无关
// - 任一任务首次出错即整体快速失败，但已启动的任务不会被主动取消，
//   会在后台自行跑完

use crate::error::UploadError;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// 在至多 `max_concurrency` 个并发下执行全部任务
pub async fn run_limited<T, F, Fut>(
    max_concurrency: usize,
    tasks: Vec<F>,
) -> Result<Vec<T>, UploadError>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, UploadError>> + Send + 'static,
    T: Send + 'static,
{
    let total = tasks.len();
    if total == 0 {
        return Ok(Vec::new());
    }

    let semaphore = Arc::new(Semaphore::new(max_concurrency.max(1)));
    let mut join_set = JoinSet::new();

    for (index, task) in tasks.into_iter().enumerate() {
        let semaphore = Arc::clone(&semaphore);
        join_set.spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                // 信号量只在本函数内创建、从不关闭
                Err(_) => return (index, Err(UploadError::Cancelled)),
            };
            (index, task().await)
        });
    }

    let mut slots: Vec<Option<T>> = Vec::with_capacity(total);
    slots.resize_with(total, || None);

    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok((index, Ok(value))) => {
                slots[index] = Some(value);
            }
            Ok((_, Err(e))) => {
                // 快速失败：不等待也不取消其余任务
                join_set.detach_all();
                return Err(e);
            }
            Err(join_err) => {
                join_set.detach_all();
                return Err(UploadError::Transfer(format!("任务异常终止: {}", join_err)));
            }
        }
    }

    let results: Vec<T> = slots.into_iter().flatten().collect();
    if results.len() != total {
        // 所有任务 join 成功时不可达
        return Err(UploadError::Transfer("任务结果不完整".to_string()));
    }
    Ok(results)
}
