use anyhow::Result;

use crate::agent::scanner::records::ChangeRecord;

/// Represents a consumer of change records. This should realistically be able to abstract over
/// different options: local aggregation, remote collector submission.
pub trait ChangeProcessor {
    fn process_next(
        &mut self,
        record: ChangeRecord,
    ) -> impl std::future::Future<Output = Result<()>>;

    fn finalize(&mut self) -> impl std::future::Future<Output = Result<()>>;
}
