//! Content-addressed contract code store (spec.md §3.6 ContractCode triplet,
//! §4.2 "Code" layer). Plain key-value, not trie-rooted: any of the three
//! hashes in a [`ContractCode`] resolves to the same blob.

use chain_db::{Column, Db};
use chain_types::{ContractCode, Result};
use ethereum_types::H256;

pub struct CodeStore<'a> {
    db: &'a Db,
}

impl<'a> CodeStore<'a> {
    pub fn new(db: &'a Db) -> Self {
        CodeStore { db }
    }

    pub fn put(&self, code: &ContractCode) -> Result<()> {
        let mut batch = self.db.new_batch();
        let blob = rlp::encode(code).to_vec();
        batch.put(Column::Code.id(), code.run_code_hash.as_bytes(), &blob);
        // source/create hashes are thin pointers into the primary run-hash entry.
        if code.source_hash != code.run_code_hash {
            batch.put(
                Column::Code.id(),
                &pointer_key(code.source_hash),
                code.run_code_hash.as_bytes(),
            );
        }
        if code.create_code_hash != code.run_code_hash {
            batch.put(
                Column::Code.id(),
                &pointer_key(code.create_code_hash),
                code.run_code_hash.as_bytes(),
            );
        }
        self.db.write(batch)
    }

    pub fn get_by_run_hash(&self, run_hash: H256) -> Result<Option<ContractCode>> {
        match self.db.get(Column::Code, run_hash.as_bytes())? {
            Some(bytes) => Ok(Some(
                rlp::decode(&bytes)
                    .map_err(|e| chain_types::Error::DbCorrupt(format!("code decode: {e}")))?,
            )),
            None => Ok(None),
        }
    }

    pub fn get_by_any_hash(&self, hash: H256) -> Result<Option<ContractCode>> {
        if let Some(code) = self.get_by_run_hash(hash)? {
            return Ok(Some(code));
        }
        if let Some(run_hash) = self.db.get(Column::Code, &pointer_key(hash))? {
            return self.get_by_run_hash(H256::from_slice(&run_hash));
        }
        Ok(None)
    }
}

fn pointer_key(hash: H256) -> [u8; 33] {
    let mut key = [0u8; 33];
    key[0] = 0x01;
    key[1..].copy_from_slice(hash.as_bytes());
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_by_create_and_source_hash() {
        let db = Db::in_memory();
        let store = CodeStore::new(&db);
        let code = ContractCode {
            source_hash: H256::repeat_byte(1),
            create_code_hash: H256::repeat_byte(2),
            run_code_hash: H256::repeat_byte(3),
            create_code: vec![0xde, 0xad],
            run_code: vec![0xbe, 0xef],
        };
        store.put(&code).unwrap();
        assert_eq!(store.get_by_any_hash(code.run_code_hash).unwrap(), Some(code.clone()));
        assert_eq!(store.get_by_any_hash(code.source_hash).unwrap(), Some(code.clone()));
        assert_eq!(store.get_by_any_hash(code.create_code_hash).unwrap(), Some(code));
    }

    #[test]
    fn unknown_hash_returns_none() {
        let db = Db::in_memory();
        let store = CodeStore::new(&db);
        assert_eq!(store.get_by_any_hash(H256::repeat_byte(9)).unwrap(), None);
    }
}
