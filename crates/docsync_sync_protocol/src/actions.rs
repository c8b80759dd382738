//! Mapping local mutations onto document actions.

use docsync_core::{Mutation, MutationOperation, PatchPayload};

use crate::error::{ProtocolError, ProtocolResult};
use crate::id_pair::IdPair;
use crate::messages::{Action, CreateAction, EditAction, IfExists};

/// Field unset by the edit sent in place of an empty action list.
pub const EMPTY_ACTION_GUARD_FIELD: &str = "_empty_action_guard_pseudo_field_";

/// True when every operation targets the published document directly.
///
/// Such commits bypass the draft workflow and go out as raw mutations.
pub fn is_live_edit(mutation: &Mutation, published_id: &str) -> bool {
    mutation
        .operations
        .iter()
        .all(|op| op.document_id() == Some(published_id))
}

/// Converts a mutation to the actions that perform it on the pair.
///
/// `createIfNotExists` operations are dropped, `create` requires an `_id`
/// and patches become edits of the draft. An empty result is replaced by an
/// edit unsetting [`EMPTY_ACTION_GUARD_FIELD`] so the server still runs a
/// transaction.
///
/// # Errors
///
/// Fails for `create` without `_id` and for `createOrReplace` and `delete`,
/// which have no action counterpart.
pub fn to_actions(pair: &IdPair, mutation: &Mutation) -> ProtocolResult<Vec<Action>> {
    let mut actions = Vec::with_capacity(mutation.operations.len());
    for operation in &mutation.operations {
        match operation {
            MutationOperation::CreateIfNotExists(_) => {}
            MutationOperation::Create(document) => {
                if document.document_id().is_none() {
                    return Err(ProtocolError::invalid_action(
                        "expected document to have an _id",
                    ));
                }
                actions.push(Action::Create(CreateAction {
                    published_id: pair.published_id.clone(),
                    attributes: document.clone(),
                    if_exists: IfExists::Fail,
                }));
            }
            MutationOperation::Patch(patch) => actions.push(Action::Edit(EditAction {
                draft_id: pair.draft_id.clone(),
                published_id: pair.published_id.clone(),
                patch: PatchPayload {
                    id: None,
                    ..patch.clone()
                },
            })),
            other => {
                return Err(ProtocolError::invalid_action(format!(
                    "cannot map {} to an action",
                    other.kind()
                )))
            }
        }
    }

    if actions.is_empty() {
        actions.push(guard_action(pair));
    }
    Ok(actions)
}

fn guard_action(pair: &IdPair) -> Action {
    Action::Edit(EditAction {
        draft_id: pair.draft_id.clone(),
        published_id: pair.published_id.clone(),
        patch: PatchPayload::default().with_unset(EMPTY_ACTION_GUARD_FIELD),
    })
}
