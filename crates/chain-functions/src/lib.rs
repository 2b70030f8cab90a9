//! The built-in function contract: a reserved destination exposing DPoS
//! staking/voting primitives to both direct transactions and EVM contracts
//! (spec.md §4.5).

pub mod abi;
pub mod handlers;
pub mod host;
pub mod selector;

pub use handlers::dispatch;
pub use host::FunctionHost;
pub use selector::Selector;

#[cfg(test)]
mod tests {
    use super::*;
    use chain_types::{ChainConfig, Destination, Error, LogEntry, Result, VoteContext};
    use ethereum_types::{H256, U256};
    use std::collections::HashMap;

    #[derive(Default)]
    struct MockHost {
        config: ChainConfig,
        height: u32,
        balances: HashMap<Destination, U256>,
        vote_contexts: HashMap<Destination, VoteContext>,
        delegate_votes: HashMap<Destination, U256>,
        function_addresses: HashMap<u32, Destination>,
        logs: Vec<LogEntry>,
    }

    impl FunctionHost for MockHost {
        fn config(&self) -> &ChainConfig {
            &self.config
        }

        fn height(&self) -> u32 {
            self.height
        }

        fn balance(&self, dest: &Destination) -> Result<U256> {
            Ok(*self.balances.get(dest).unwrap_or(&U256::zero()))
        }

        fn transfer(&mut self, from: &Destination, to: &Destination, amount: U256) -> Result<()> {
            let from_balance = *self.balances.get(from).unwrap_or(&U256::zero());
            if from_balance < amount {
                return Err(Error::InsufficientFunds(format!("{from}")));
            }
            *self.balances.entry(*from).or_default() -= amount;
            *self.balances.entry(*to).or_default() += amount;
            Ok(())
        }

        fn vote_context(&self, dest: &Destination) -> Result<Option<VoteContext>> {
            Ok(self.vote_contexts.get(dest).cloned())
        }

        fn set_vote_context(&mut self, dest: &Destination, ctx: VoteContext) -> Result<()> {
            self.vote_contexts.insert(*dest, ctx);
            Ok(())
        }

        fn delegate_vote_amount(&self, dest: &Destination) -> Result<U256> {
            Ok(*self.delegate_votes.get(dest).unwrap_or(&U256::zero()))
        }

        fn add_delegate_vote(&mut self, dest: &Destination, delta: U256) -> Result<()> {
            *self.delegate_votes.entry(*dest).or_default() += delta;
            Ok(())
        }

        fn sub_delegate_vote(&mut self, dest: &Destination, delta: U256) -> Result<()> {
            let entry = self.delegate_votes.entry(*dest).or_default();
            *entry = entry.saturating_sub(delta);
            Ok(())
        }

        fn delegate_roll(&self) -> Result<Vec<(Destination, U256)>> {
            let mut roll: Vec<_> = self.delegate_votes.iter().map(|(d, v)| (*d, *v)).collect();
            roll.sort_by(|a, b| b.1.cmp(&a.1));
            Ok(roll)
        }

        fn function_address(&self, id: u32) -> Result<Option<Destination>> {
            Ok(self.function_addresses.get(&id).copied())
        }

        fn set_function_address(&mut self, id: u32, addr: Destination) -> Result<()> {
            self.function_addresses.insert(id, addr);
            Ok(())
        }

        fn emit_log(&mut self, log: LogEntry) {
            self.logs.push(log);
        }
    }

    fn call(selector_sig: &str, args: Vec<u8>) -> Vec<u8> {
        let hash = chain_types::hash::keccak(selector_sig.as_bytes());
        let mut out = hash.as_bytes()[0..4].to_vec();
        out.extend(args);
        out
    }

    #[test]
    fn user_vote_then_redeem_respects_the_lock() {
        let mut host = MockHost::default();
        let sender = Destination::pubkey(H256::repeat_byte(1));
        host.balances.insert(sender, U256::from(1_000));
        let delegate = H256::repeat_byte(9);

        let mut call_data = call("userVote(bytes32,uint8,uint256)", vec![]);
        call_data.extend_from_slice(delegate.as_bytes());
        call_data.extend_from_slice(&[0u8; 32]); // reward mode 0, padded word
        let mut amount_word = [0u8; 32];
        U256::from(100).to_big_endian(&mut amount_word);
        call_data.extend_from_slice(&amount_word);

        host.height = 10;
        let (gas, _) = dispatch(&mut host, &sender, &call_data).unwrap();
        assert!(gas > 0);
        assert_eq!(host.balances[&sender], U256::from(900));

        // redeem before unlock fails
        let redeem_call = call_data_with_selector("userRedeem(bytes32,uint8,uint256)", &call_data[4..]);
        let err = dispatch(&mut host, &sender, &redeem_call).unwrap_err();
        assert!(matches!(err, Error::ConsensusReject(_)));

        // redeem after unlock succeeds
        host.height = 10 + host.config.vote_redeem_height;
        dispatch(&mut host, &sender, &redeem_call).unwrap();
        assert_eq!(host.balances[&sender], U256::from(1_000));
    }

    fn call_data_with_selector(sig: &str, args: &[u8]) -> Vec<u8> {
        let mut out = call(sig, vec![]);
        out.extend_from_slice(args);
        out
    }

    #[test]
    fn set_function_address_rejects_an_address_already_holding_another_id() {
        let mut host = MockHost::default();
        let caller = Destination::pubkey(H256::repeat_byte(2));
        let addr_a = Destination::pubkey(H256::repeat_byte(3));
        host.function_addresses.insert(0, caller);
        host.function_addresses.insert(1, addr_a);

        let mut call_data = call("setFunctionAddress(uint32,bytes32,bool)", vec![]);
        call_data.extend_from_slice(&[0u8; 28]);
        call_data.extend_from_slice(&0u32.to_be_bytes());
        call_data.extend_from_slice(&[0u8; 31]);
        call_data.push(0x03); // tag byte for destination
        call_data.extend_from_slice(addr_a.id().as_bytes());
        call_data.extend_from_slice(&[0u8; 32]);

        let err = dispatch(&mut host, &caller, &call_data).unwrap_err();
        assert!(matches!(err, Error::Invalid(_)));
    }

    #[test]
    fn get_page_size_returns_the_configured_value() {
        let mut host = MockHost::default();
        let caller = Destination::pubkey(H256::repeat_byte(4));
        let call_data = call("getPageSize()", vec![]);
        let (_, result) = dispatch(&mut host, &caller, &call_data).unwrap();
        let mut expected = [0u8; 32];
        U256::from(host.config.page_size).to_big_endian(&mut expected);
        assert_eq!(result, expected.to_vec());
    }
}
