use ethers::types::{Address, Bytes, GethTrace, U256};
use serde::Deserialize;
use std::collections::HashMap;

/// Output of the collector tracer for one `simulateValidation` run
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JsTracerFrame {
    pub calls_from_entry_point: Vec<CallFromEntryPoint>,
    pub keccak: Vec<Bytes>,
    pub logs: Vec<Log>,
    pub calls: Vec<Call>,
    pub debug: Vec<String>,
}

impl TryFrom<GethTrace> for JsTracerFrame {
    type Error = serde_json::Error;
    fn try_from(val: GethTrace) -> Result<Self, Self::Error> {
        match val {
            GethTrace::Known(val) => serde_json::from_value(serde_json::to_value(val)?),
            GethTrace::Unknown(val) => serde_json::from_value(val),
        }
    }
}

/// Aggregated per-opcode and per-slot access info of one top-level call frame
/// made by the entry point during validation
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallFromEntryPoint {
    /// First 4 bytes of the top-level call input
    pub top_level_method_sig: Bytes,
    #[serde(default)]
    pub top_level_target_address: Option<Address>,
    #[serde(default)]
    pub access: HashMap<Address, ReadsAndWrites>,
    #[serde(default)]
    pub opcodes: HashMap<String, u64>,
    #[serde(default)]
    pub ext_code_access_info: HashMap<Address, String>,
    #[serde(default)]
    pub contract_size: HashMap<Address, ContractSizeInfo>,
    #[serde(default)]
    pub oog: Option<bool>,
}

/// First-read values and write counts per storage slot
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ReadsAndWrites {
    pub reads: HashMap<String, String>,
    pub writes: HashMap<String, u64>,
}

/// Size and accessing opcode of a contract touched during validation
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractSizeInfo {
    pub opcode: String,
    pub contract_size: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Log {
    pub topics: Vec<String>,
    pub data: Bytes,
}

/// Call frame enter/exit record
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Call {
    #[serde(rename = "type")]
    pub typ: String,
    pub gas_used: Option<u64>,
    pub data: Option<Bytes>,
    pub from: Option<Address>,
    pub to: Option<Address>,
    pub method: Option<Bytes>,
    pub gas: Option<u64>,
    pub value: Option<U256>,
}

/// Parsed call entry after matching enters with exits
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallEntry {
    pub typ: String,
    pub from: Option<Address>,
    pub to: Option<Address>,
    pub method: Option<String>,
    pub ret: Option<Bytes>,
    pub rev: Option<Bytes>,
    pub value: Option<U256>,
}

// The collector tracer running inside the Ethereum node during
// debug_traceCall of EntryPoint.simulateValidation.
// https://github.com/eth-infinitism/bundler/blob/main/packages/bundler/src/BundlerCollectorTracer.ts
pub const JS_TRACER: &str = r#"
{
    callsFromEntryPoint: [],
    currentLevel: null,
    keccak: [],
    calls: [],
    logs: [],
    debug: [],
    lastOp: '',
    lastThreeOpcodes: [],
    stopCollectingTopic: 'bb47ee3e183a558b1a2ff0874b079f3fc5478b7454eacf2bfc5af2ff5878f972',
    stopCollecting: false,
    topLevelCallCounter: 0,
    fault(log, db) {
        this.debug.push('fault depth=' + log.getDepth() + ' gas=' + log.getGas() + ' cost=' + log.getCost() + ' err=' + log.getError());
    },
    result(ctx, db) {
        return {
            callsFromEntryPoint: this.callsFromEntryPoint,
            keccak: this.keccak,
            logs: this.logs,
            calls: this.calls,
            debug: this.debug // for internal debugging.
        };
    },
    enter(frame) {
        if (this.stopCollecting) {
            return;
        }
        this.calls.push({
            type: frame.getType(),
            from: toHex(frame.getFrom()),
            to: toHex(frame.getTo()),
            method: toHex(frame.getInput()).slice(0, 10),
            gas: frame.getGas(),
            value: frame.getValue()
        });
    },
    exit(frame) {
        if (this.stopCollecting) {
            return;
        }
        this.calls.push({
            type: frame.getError() != null ? 'REVERT' : 'RETURN',
            gasUsed: frame.getGasUsed(),
            data: toHex(frame.getOutput()).slice(0, 4000)
        });
    },
    // increment the "key" in the list. if the key is not defined yet, then set it to "1"
    countSlot(list, key) {
        var _a;
        list[key] = ((_a = list[key]) !== null && _a !== void 0 ? _a : 0) + 1;
    },
    step(log, db) {
        if (this.stopCollecting) {
            return;
        }
        const opcode = log.op.toString();
        const stackSize = log.stack.length();
        const stackTop3 = [];
        for (let i = 0; i < 3 && i < stackSize; i++) {
            stackTop3.push(log.stack.peek(i));
        }
        this.lastThreeOpcodes.push({ opcode, stackTop3 });
        if (this.lastThreeOpcodes.length > 3) {
            this.lastThreeOpcodes.shift();
        }
        if (log.getGas() < log.getCost() || (opcode === 'SSTORE' && log.getGas() < 2300)) {
            this.currentLevel.oog = true;
        }
        if (opcode === 'REVERT' || opcode === 'RETURN') {
            if (log.getDepth() === 1) {
                // exit() is not called on top-level return/revert, so we reconstruct it
                // from opcode
                const ofs = parseInt(log.stack.peek(0).toString());
                const len = parseInt(log.stack.peek(1).toString());
                const data = toHex(log.memory.slice(ofs, ofs + len)).slice(0, 4000);
                this.calls.push({
                    type: opcode,
                    gasUsed: 0,
                    data
                });
            }
            this.lastThreeOpcodes = [];
        }
        if (log.getDepth() === 1) {
            if (opcode === 'CALL' || opcode === 'STATICCALL') {
                // stack.peek(0) - gas
                const addr = toAddress(log.stack.peek(1).toString(16));
                const topLevelTargetAddress = toHex(addr);
                // stack.peek(2) - value
                const ofs = parseInt(log.stack.peek(3).toString());
                // stack.peek(4) - len
                const topLevelMethodSig = toHex(log.memory.slice(ofs, ofs + 4));
                this.currentLevel = this.callsFromEntryPoint[this.topLevelCallCounter] = {
                    topLevelMethodSig,
                    topLevelTargetAddress,
                    access: {},
                    opcodes: {},
                    extCodeAccessInfo: {},
                    contractSize: {}
                };
                this.topLevelCallCounter++;
            }
            else if (opcode === 'LOG1') {
                // ignore log data ofs, len
                const topic = log.stack.peek(2).toString(16);
                if (topic === this.stopCollectingTopic) {
                    this.stopCollecting = true;
                }
            }
            this.lastOp = '';
            return;
        }
        const lastOpInfo = this.lastThreeOpcodes[this.lastThreeOpcodes.length - 2];
        // store all addresses touched by EXTCODE* opcodes
        if (lastOpInfo && lastOpInfo.opcode.match(/^(EXT.*)$/) != null) {
            const addr = toAddress(lastOpInfo.stackTop3[0].toString(16));
            const addrHex = toHex(addr);
            const last3opcodesString = this.lastThreeOpcodes.map(x => x.opcode).join(' ');
            // only store the last EXTCODE* opcode per address - could even be a boolean
            if (last3opcodesString.match(/^(\w+) EXTCODESIZE ISZERO$/) == null) {
                this.currentLevel.extCodeAccessInfo[addrHex] = opcode;
            }
        }
        // [OP-041] - access to an address without deployed code is forbidden for
        // EXTCODE* and *CALL opcodes
        const isAllowedPrecompiled = (address) => {
            const addrHex = toHex(address);
            const addrInt = parseInt(addrHex);
            return addrInt > 0 && addrInt < 10;
        };
        if (opcode.match(/^(EXT.*|CALL|CALLCODE|DELEGATECALL|STATICCALL)$/) != null) {
            const idx = opcode.startsWith('EXT') ? 0 : 1;
            const addr = toAddress(log.stack.peek(idx).toString(16));
            const addrHex = toHex(addr);
            if (this.currentLevel.contractSize[addrHex] == null && !isAllowedPrecompiled(addr)) {
                this.currentLevel.contractSize[addrHex] = {
                    contractSize: db.getCode(addr).length,
                    opcode
                };
            }
        }
        if (this.lastOp === 'GAS' && !opcode.includes('CALL')) {
            // count "GAS" opcode only if not followed by "CALL"
            this.countSlot(this.currentLevel.opcodes, 'GAS');
        }
        if (opcode !== 'GAS') {
            // ignore "unimportant" opcodes
            if (opcode.match(/^(DUP\d+|PUSH\d+|SWAP\d+|POP|ADD|SUB|MUL|DIV|EQ|LTE?|S?GTE?|SLT|SH[LR]|AND|OR|NOT|ISZERO)$/) == null) {
                this.countSlot(this.currentLevel.opcodes, opcode);
            }
        }
        this.lastOp = opcode;
        if (opcode === 'SLOAD' || opcode === 'SSTORE') {
            const slot = toWord(log.stack.peek(0).toString(16));
            const slotHex = toHex(slot);
            const addr = log.contract.getAddress();
            const addrHex = toHex(addr);
            let access = this.currentLevel.access[addrHex];
            if (access == null) {
                access = {
                    reads: {},
                    writes: {}
                };
                this.currentLevel.access[addrHex] = access;
            }
            if (opcode === 'SLOAD') {
                // read slot values before this UserOp was created
                // (so saving it if it was written before the first read)
                if (access.reads[slotHex] == null && access.writes[slotHex] == null) {
                    access.reads[slotHex] = toHex(db.getState(addr, slot));
                }
            }
            else {
                this.countSlot(access.writes, slotHex);
            }
        }
        if (opcode === 'KECCAK256') {
            // collect keccak on 64-byte blocks
            const ofs = parseInt(log.stack.peek(0).toString());
            const len = parseInt(log.stack.peek(1).toString());
            // currently, solidity uses only 2-word (6-byte) for a key. this might change..
            // still, no need to return too much
            if (len > 20 && len < 512) {
                this.keccak.push(toHex(log.memory.slice(ofs, ofs + len)));
            }
        }
        else if (opcode.startsWith('LOG')) {
            const count = parseInt(opcode.substring(3));
            const ofs = parseInt(log.stack.peek(0).toString());
            const len = parseInt(log.stack.peek(1).toString());
            const topics = [];
            for (let i = 0; i < count; i++) {
                topics.push('0x' + log.stack.peek(2 + i).toString(16));
            }
            const data = toHex(log.memory.slice(ofs, ofs + len));
            this.logs.push({
                topics,
                data
            });
        }
    }
}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_tracer_output() {
        let raw = serde_json::json!({
            "callsFromEntryPoint": [
                {
                    "topLevelMethodSig": "0x3a871cdd",
                    "topLevelTargetAddress": "0x9c5754de1443984659e1b3a8d1931d83475ba29c",
                    "access": {
                        "0x9c5754de1443984659e1b3a8d1931d83475ba29c": {
                            "reads": {
                                "0x0000000000000000000000000000000000000000000000000000000000000000": "0x0000000000000000000000000000000000000000000000000000000000000001"
                            },
                            "writes": {
                                "0x0000000000000000000000000000000000000000000000000000000000000001": 2
                            }
                        }
                    },
                    "opcodes": { "SLOAD": 1, "SSTORE": 2, "KECCAK256": 1 },
                    "extCodeAccessInfo": {},
                    "contractSize": {
                        "0x1f9090aae28b8a3dceadf281b0f12828e676c326": { "contractSize": 42, "opcode": "CALL" }
                    }
                }
            ],
            "keccak": ["0x00000000000000000000000038753c4a8a5f08f8fcd2ff2b33a670001daeba0fdeadbeef"],
            "logs": [],
            "calls": [
                { "type": "REVERT", "gasUsed": 0, "data": "0x08c379a0" }
            ],
            "debug": []
        });

        let frame: JsTracerFrame =
            JsTracerFrame::try_from(GethTrace::Unknown(raw)).expect("tracer output parses");

        assert_eq!(frame.calls_from_entry_point.len(), 1);
        let level = &frame.calls_from_entry_point[0];
        assert_eq!(level.top_level_method_sig, Bytes::from(vec![0x3a, 0x87, 0x1c, 0xdd]));
        assert_eq!(level.opcodes.get("SSTORE"), Some(&2));
        let access = level
            .access
            .get(&"0x9c5754de1443984659e1b3a8d1931d83475ba29c".parse::<Address>().unwrap())
            .unwrap();
        assert_eq!(access.reads.len(), 1);
        assert_eq!(access.writes.len(), 1);
        assert_eq!(frame.calls[0].typ, "REVERT");
    }

    #[test]
    fn tracer_mentions_stop_collection_marker() {
        // marker topic of the entry point's BeforeExecution log
        assert!(JS_TRACER.contains("bb47ee3e183a558b1a2ff0874b079f3fc5478b7454eacf2bfc5af2ff5878f972"));
    }
}
