//! Read paths shared by `Database` and `WritableDatabase`

use crate::batch::{
    docid_key, position_key, read_stats, DatabaseStats, DocId, PositionList, Posting,
    PostingList, StoredDocument, TermList, ValueSet,
};
use crate::errors::{DatabaseError, DbResult};
use crate::manager::TableManager;
use crate::table::TableKind;

pub(crate) fn stats(manager: &mut TableManager) -> DbResult<DatabaseStats> {
    read_stats(manager)
}

fn require_document(manager: &mut TableManager, docid: DocId) -> DbResult<Vec<u8>> {
    if docid == 0 {
        return Err(DatabaseError::doc_not_found(docid));
    }
    manager
        .get(TableKind::Records, &docid_key(docid))?
        .ok_or_else(|| DatabaseError::doc_not_found(docid))
}

pub(crate) fn document(manager: &mut TableManager, docid: DocId) -> DbResult<StoredDocument> {
    let data = require_document(manager, docid)?;
    let key = docid_key(docid);

    let terms = match manager.get(TableKind::Terms, &key)? {
        Some(tag) => TermList::decode(&tag)?,
        None => TermList::default(),
    };
    let values = match manager.get(TableKind::Values, &key)? {
        Some(tag) => ValueSet::decode(&tag)?.0,
        None => Default::default(),
    };

    Ok(StoredDocument {
        docid,
        data,
        terms: terms.entries,
        values,
        length: terms.doc_length,
    })
}

pub(crate) fn value(manager: &mut TableManager, docid: DocId, slot: u32) -> DbResult<Option<Vec<u8>>> {
    require_document(manager, docid)?;
    match manager.get(TableKind::Values, &docid_key(docid))? {
        Some(tag) => Ok(ValueSet::decode(&tag)?.0.remove(&slot)),
        None => Ok(None),
    }
}

fn posting_list(manager: &mut TableManager, term: &str) -> DbResult<PostingList> {
    match manager.get(TableKind::Postings, term.as_bytes())? {
        Some(tag) => Ok(PostingList::decode(&tag)?),
        None => Ok(PostingList::default()),
    }
}

pub(crate) fn term_freq(manager: &mut TableManager, term: &str) -> DbResult<u32> {
    Ok(posting_list(manager, term)?.len() as u32)
}

pub(crate) fn postings(manager: &mut TableManager, term: &str) -> DbResult<Vec<Posting>> {
    Ok(posting_list(manager, term)?.into_vec())
}

/// Positions of `term` in `docid`; empty if the term was added without any.
pub(crate) fn positions(manager: &mut TableManager, docid: DocId, term: &str) -> DbResult<Vec<u32>> {
    require_document(manager, docid)?;
    match manager.get(TableKind::Positions, &position_key(docid, term))? {
        Some(tag) => Ok(PositionList::decode(&tag)?.0),
        None => Ok(Vec::new()),
    }
}
