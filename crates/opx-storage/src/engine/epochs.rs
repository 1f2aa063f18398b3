//! # Epoch Repository
//!
//! Epoch windows keyed by number, with a start-block index for
//! height-based lookup, plus per-epoch submissions.

use super::{StorageEngine, WriteContext};
use crate::backend::BatchOperation;
use crate::error::StorageError;
use crate::keys::{self, Collection};
use shared_types::{Epoch, EpochSubmission, EPOCH_OPEN_SENTINEL};

impl StorageEngine {
    /// Persist (or overwrite) an epoch.
    pub fn save_epoch(
        &self,
        epoch: &Epoch,
        ctx: Option<&mut WriteContext>,
    ) -> Result<(), StorageError> {
        self.apply(
            ctx,
            vec![
                BatchOperation::put(
                    Collection::Epochs,
                    epoch.number.to_be_bytes().to_vec(),
                    bincode::serialize(epoch)?,
                ),
                BatchOperation::put(
                    Collection::EpochByBlock,
                    keys::height_key(epoch.start_block).to_vec(),
                    epoch.number.to_be_bytes().to_vec(),
                ),
            ],
        )
    }

    /// The epoch with the greatest number.
    pub fn get_latest_epoch(&self) -> Result<Option<Epoch>, StorageError> {
        match self.backend().last(Collection::Epochs)? {
            Some((_, bytes)) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Epoch by number.
    pub fn get_epoch_by_number(&self, number: u64) -> Result<Option<Epoch>, StorageError> {
        match self
            .backend()
            .get(Collection::Epochs, &number.to_be_bytes())?
        {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// The epoch whose window contains `height`.
    pub fn get_epoch_by_block_height(&self, height: u64) -> Result<Option<Epoch>, StorageError> {
        let Some(end) = height.checked_add(1) else {
            return Ok(None);
        };
        let entries = self.backend().scan_range(
            Collection::EpochByBlock,
            &keys::height_key(0),
            &keys::height_key(end),
        )?;
        let Some((_, number_bytes)) = entries.last() else {
            return Ok(None);
        };
        let Some(number) = keys::decode_height(number_bytes) else {
            return Ok(None);
        };
        let Some(epoch) = self.get_epoch_by_number(number)? else {
            return Ok(None);
        };
        let in_window = epoch.end_block == EPOCH_OPEN_SENTINEL
            || height <= epoch.end_block as u64;
        Ok(in_window.then_some(epoch))
    }

    /// The open epoch, if one exists.
    pub fn get_active_epoch(&self) -> Result<Option<Epoch>, StorageError> {
        Ok(self.get_latest_epoch()?.filter(Epoch::is_active))
    }

    /// Close (or reopen) an epoch window.
    pub fn update_epoch_end_block(
        &self,
        number: u64,
        end_block: i64,
        ctx: Option<&mut WriteContext>,
    ) -> Result<(), StorageError> {
        let Some(mut epoch) = self.get_epoch_by_number(number)? else {
            return Err(StorageError::Backend(format!("unknown epoch {number}")));
        };
        epoch.end_block = end_block;
        self.apply(
            ctx,
            vec![BatchOperation::put(
                Collection::Epochs,
                number.to_be_bytes().to_vec(),
                bincode::serialize(&epoch)?,
            )],
        )
    }

    /// Delete every epoch with number ≥ `from_number`.
    pub fn delete_epochs_from_number(
        &self,
        from_number: u64,
        ctx: Option<&mut WriteContext>,
    ) -> Result<(), StorageError> {
        let entries = self.backend().scan_range(
            Collection::Epochs,
            &from_number.to_be_bytes(),
            &[0xFF; 9],
        )?;
        let mut ops = Vec::with_capacity(entries.len() * 2);
        for (key, bytes) in entries {
            let epoch: Epoch = bincode::deserialize(&bytes)?;
            ops.push(BatchOperation::delete(
                Collection::EpochByBlock,
                keys::height_key(epoch.start_block).to_vec(),
            ));
            ops.extend(self.submission_delete_ops(epoch.number)?);
            ops.push(BatchOperation::delete(Collection::Epochs, key));
        }
        self.apply(ctx, ops)
    }

    /// Reorg entry point: delete epochs starting at or above the fork and
    /// reopen the epoch containing it.
    pub fn delete_epochs_from_block(
        &self,
        from_height: u64,
        ctx: Option<&mut WriteContext>,
    ) -> Result<(), StorageError> {
        let mut ops = Vec::new();
        let entries = self.backend().scan_prefix(Collection::Epochs, &[])?;
        for (key, bytes) in entries {
            let epoch: Epoch = bincode::deserialize(&bytes)?;
            if epoch.start_block >= from_height {
                ops.push(BatchOperation::delete(
                    Collection::EpochByBlock,
                    keys::height_key(epoch.start_block).to_vec(),
                ));
                ops.extend(self.submission_delete_ops(epoch.number)?);
                ops.push(BatchOperation::delete(Collection::Epochs, key));
            } else if epoch.end_block != EPOCH_OPEN_SENTINEL
                && epoch.end_block as u64 >= from_height
            {
                let mut reopened = epoch;
                reopened.end_block = EPOCH_OPEN_SENTINEL;
                ops.push(BatchOperation::put(
                    Collection::Epochs,
                    key,
                    bincode::serialize(&reopened)?,
                ));
            }
        }
        self.apply(ctx, ops)
    }

    // =========================================================================
    // SUBMISSIONS
    // =========================================================================

    /// Record a candidate submission for an epoch.
    pub fn save_epoch_submission(
        &self,
        submission: &EpochSubmission,
        ctx: Option<&mut WriteContext>,
    ) -> Result<(), StorageError> {
        self.apply(
            ctx,
            vec![BatchOperation::put(
                Collection::EpochSubmissions,
                keys::epoch_submission_key(
                    submission.epoch_number,
                    &submission.submitter_public_key,
                ),
                bincode::serialize(submission)?,
            )],
        )
    }

    /// All submissions for one epoch.
    pub fn get_epoch_submissions(
        &self,
        epoch_number: u64,
    ) -> Result<Vec<EpochSubmission>, StorageError> {
        let entries = self
            .backend()
            .scan_prefix(Collection::EpochSubmissions, &epoch_number.to_be_bytes())?;
        entries
            .iter()
            .map(|(_, bytes)| bincode::deserialize(bytes).map_err(StorageError::from))
            .collect()
    }

    fn submission_delete_ops(
        &self,
        epoch_number: u64,
    ) -> Result<Vec<BatchOperation>, StorageError> {
        let entries = self
            .backend()
            .scan_prefix(Collection::EpochSubmissions, &epoch_number.to_be_bytes())?;
        Ok(entries
            .into_iter()
            .map(|(key, _)| BatchOperation::delete(Collection::EpochSubmissions, key))
            .collect())
    }
}
