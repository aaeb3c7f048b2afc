use std::future::Future;

use tokio::task::{
  JoinError,
  JoinSet
};
use tracing::{
  debug,
  warn
};

/// Runs `transform` over every input
/// concurrently and returns the results
/// in input order.
///
/// The first failure aborts the
/// remaining tasks and is returned;
/// partial results are discarded. A
/// panicking transform resumes the panic
/// on the caller.
#[tracing::instrument(skip_all)]
pub async fn parallel_map<I, T, E, F, Fut>(
  inputs: impl IntoIterator<Item = I>,
  transform: F
) -> Result<Vec<T>, E>
where
  F: Fn(I) -> Fut,
  Fut: Future<Output = Result<T, E>>
    + Send
    + 'static,
  T: Send + 'static,
  E: From<JoinError> + Send + 'static
{
  let mut set = JoinSet::new();
  let mut len = 0_usize;
  for (index, input) in
    inputs.into_iter().enumerate()
  {
    let task = transform(input);
    set.spawn(async move {
      (index, task.await)
    });
    len += 1;
  }

  debug!(count = len, "fanned out");

  let mut slots: Vec<Option<T>> =
    Vec::with_capacity(len);
  slots.resize_with(len, || None);

  while let Some(joined) =
    set.join_next().await
  {
    let (index, result) = match joined {
      | Ok(pair) => pair,
      | Err(err) if err.is_panic() => {
        std::panic::resume_unwind(
          err.into_panic()
        )
      }
      | Err(err) => {
        set.abort_all();
        return Err(E::from(err));
      }
    };

    match result {
      | Ok(value) => slots[index] = Some(value),
      | Err(err) => {
        warn!(
          index,
          "parallel task failed; aborting \
           the rest"
        );
        set.abort_all();
        return Err(err);
      }
    }
  }

  Ok(slots.into_iter().flatten().collect())
}
