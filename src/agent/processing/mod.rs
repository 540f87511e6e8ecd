use anyhow::Result;
use module::ChangeProcessor;
use tokio::sync::mpsc::Receiver;
use tracing::{debug, error, info};

use super::scanner::records::ChangeRecord;

pub mod module;
pub mod recorder;

/// Receives change records from the scanner and hands them to a processor. A
/// processor failure only loses that one record, the loop keeps running until
/// the sending side is dropped.
pub struct ProcessingModule<Processor> {
    receiver: Receiver<ChangeRecord>,
    processor: Processor,
}

impl<P: ChangeProcessor> ProcessingModule<P> {
    pub fn new(receiver: Receiver<ChangeRecord>, processor: P) -> Self {
        Self {
            receiver,
            processor,
        }
    }

    pub async fn run(mut self) -> Result<()> {
        while let Some(record) = self.receiver.recv().await {
            debug!("Processing record {:?}", record);
            match self.processor.process_next(record.clone()).await {
                Ok(_) => {
                    info!("Processed record {:?}", record)
                }
                Err(e) => {
                    error!("Error processing record {:?}: {e:?}", record)
                }
            }
        }

        let result = self.processor.finalize().await;
        self.receiver.close();
        result
    }
}
