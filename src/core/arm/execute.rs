// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 itsakeyfut
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! ARM instruction fetch/decode/execute
//!
//! Decode follows the ARM DDI 0100E grouping: the top-level dispatch is on
//! bits 27..26, with the data-processing block further split to carve out
//! MRS/MSR/BX, the multiply/SWP extension space, and the half-word transfer
//! encodings (recognised but unimplemented). Any register operand that names
//! r15 reads as the instruction address + 8; r15 has already been advanced
//! past the instruction when operands are evaluated.

use crate::core::error::{EmulatorError, Result};

use super::{Arm7, ArmException, ArmMemory, CPSR_F};

#[inline]
fn rn_idx(ir: u32) -> usize {
    ((ir >> 16) & 0x0F) as usize
}

#[inline]
fn rd_idx(ir: u32) -> usize {
    ((ir >> 12) & 0x0F) as usize
}

#[inline]
fn rs_idx(ir: u32) -> usize {
    ((ir >> 8) & 0x0F) as usize
}

#[inline]
fn rm_idx(ir: u32) -> usize {
    (ir & 0x0F) as usize
}

#[inline]
fn imm8(ir: u32) -> u32 {
    ir & 0xFF
}

#[inline]
fn imm12(ir: u32) -> u32 {
    ir & 0xFFF
}

#[inline]
fn shift_imm(ir: u32) -> u32 {
    (ir >> 7) & 0x1F
}

#[inline]
fn imm_rot(ir: u32) -> u32 {
    (ir >> 7) & 0x1E
}

#[inline]
fn sign_extend_24(n: u32) -> u32 {
    if n & 0x0080_0000 != 0 {
        n | 0xFF00_0000
    } else {
        n & 0x00FF_FFFF
    }
}

impl Arm7 {
    /// Operand read of a general register: r15 reads as pc + 8
    #[inline]
    fn op_reg(&self, n: usize) -> u32 {
        if n == 15 {
            self.r[15].wrapping_add(4)
        } else {
            self.r[n]
        }
    }

    #[inline]
    fn set_nz(&mut self, value: u32) {
        self.n = value & 0x8000_0000 != 0;
        self.z = value == 0;
    }

    /// Addition with full NZCV update; `carry_in` is 0 or 1
    fn alu_adds(&mut self, op1: u32, op2: u32, carry_in: u32) -> u32 {
        let wide = u64::from(op1) + u64::from(op2) + u64::from(carry_in);
        let result = wide as u32;
        self.set_nz(result);
        self.c = wide > 0xFFFF_FFFF;
        let signed = i64::from(op1 as i32) + i64::from(op2 as i32) + i64::from(carry_in);
        self.v = signed != i64::from(result as i32);
        result
    }

    /// Subtraction with full NZCV update; carry is the not-borrow
    /// convention and `borrow_in` is 0 or 1
    fn alu_subs(&mut self, op1: u32, op2: u32, borrow_in: u32) -> u32 {
        let result = op1.wrapping_sub(op2).wrapping_sub(borrow_in);
        self.set_nz(result);
        self.c = u64::from(op1) >= u64::from(op2) + u64::from(borrow_in);
        let signed = i64::from(op1 as i32) - i64::from(op2 as i32) - i64::from(borrow_in);
        self.v = signed != i64::from(result as i32);
        result
    }

    /// Evaluate the condition field against the cached flags. `None` means
    /// the reserved NV condition (undefined instruction).
    fn condition_passed(&self, cond: u32) -> Option<bool> {
        match cond {
            0x0 => Some(self.z),                      // EQ
            0x1 => Some(!self.z),                     // NE
            0x2 => Some(self.c),                      // CS/HS
            0x3 => Some(!self.c),                     // CC/LO
            0x4 => Some(self.n),                      // MI
            0x5 => Some(!self.n),                     // PL
            0x6 => Some(self.v),                      // VS
            0x7 => Some(!self.v),                     // VC
            0x8 => Some(self.c && !self.z),           // HI
            0x9 => Some(!self.c || self.z),           // LS
            0xA => Some(self.n == self.v),            // GE
            0xB => Some(self.n != self.v),            // LT
            0xC => Some(!self.z && self.n == self.v), // GT
            0xD => Some(self.z || self.n != self.v),  // LE
            0xE => Some(true),                        // AL
            _ => None,                                // NV
        }
    }

    /// Shift-operand for data processing, without computing the carry-out
    /// (addressing mode 1, DDI 0100E s5.1)
    fn get_shift_operand(&self, ir: u32) -> u32 {
        if ir & 0x0200_0000 != 0 {
            return imm8(ir).rotate_right(imm_rot(ir));
        }
        let operand = self.op_reg(rm_idx(ir));
        match (ir >> 4) & 0x07 {
            0 => operand << shift_imm(ir), // LSL imm
            1 => {
                // LSL reg
                let amount = self.op_reg(rs_idx(ir)) & 0xFF;
                if amount > 31 {
                    0
                } else {
                    operand << amount
                }
            }
            2 => {
                // LSR imm (0 encodes 32)
                let amount = shift_imm(ir);
                if amount == 0 {
                    0
                } else {
                    operand >> amount
                }
            }
            3 => {
                // LSR reg
                let amount = self.op_reg(rs_idx(ir)) & 0xFF;
                if amount > 31 {
                    0
                } else {
                    operand >> amount
                }
            }
            4 => {
                // ASR imm (0 encodes 32)
                let amount = shift_imm(ir);
                if amount == 0 {
                    ((operand as i32) >> 31) as u32
                } else {
                    ((operand as i32) >> amount) as u32
                }
            }
            5 => {
                // ASR reg
                let amount = self.op_reg(rs_idx(ir)) & 0xFF;
                if amount > 31 {
                    ((operand as i32) >> 31) as u32
                } else {
                    ((operand as i32) >> amount) as u32
                }
            }
            6 => {
                // ROR imm, or RRX when the amount is 0
                let amount = shift_imm(ir);
                if amount == 0 {
                    (operand >> 1) | ((self.c as u32) << 31)
                } else {
                    operand.rotate_right(amount)
                }
            }
            _ => {
                // ROR reg
                let amount = self.op_reg(rs_idx(ir)) & 0x1F;
                operand.rotate_right(amount)
            }
        }
    }

    /// Shift-operand for data processing, also latching the shifter
    /// carry-out into `shift_c`
    fn get_shift_operand_s(&mut self, ir: u32) -> u32 {
        if ir & 0x0200_0000 != 0 {
            let rot = imm_rot(ir);
            let operand = imm8(ir);
            return if rot == 0 {
                self.shift_c = self.c;
                operand
            } else {
                let operand = operand.rotate_right(rot);
                self.shift_c = operand >> 31 != 0;
                operand
            };
        }

        let operand = self.op_reg(rm_idx(ir));
        match (ir >> 4) & 0x07 {
            0 => {
                let amount = shift_imm(ir);
                if amount == 0 {
                    self.shift_c = self.c;
                    operand
                } else {
                    self.shift_c = (operand >> (32 - amount)) & 0x01 != 0;
                    operand << amount
                }
            }
            1 => {
                let amount = self.op_reg(rs_idx(ir)) & 0xFF;
                if amount == 0 {
                    self.shift_c = self.c;
                    operand
                } else {
                    self.shift_c = match amount {
                        1..=31 => (operand >> (32 - amount)) & 0x01 != 0,
                        32 => operand & 0x01 != 0,
                        _ => false,
                    };
                    if amount < 32 {
                        operand << amount
                    } else {
                        0
                    }
                }
            }
            2 => {
                let amount = shift_imm(ir);
                if amount == 0 {
                    self.shift_c = operand >> 31 != 0;
                    0
                } else {
                    self.shift_c = (operand >> (amount - 1)) & 0x01 != 0;
                    operand >> amount
                }
            }
            3 => {
                let amount = self.op_reg(rs_idx(ir)) & 0xFF;
                if amount == 0 {
                    self.shift_c = self.c;
                    operand
                } else {
                    self.shift_c = if amount <= 32 {
                        (operand >> (amount.min(32) - 1)) & 0x01 != 0
                    } else {
                        false
                    };
                    if amount < 32 {
                        operand >> amount
                    } else {
                        0
                    }
                }
            }
            4 => {
                let amount = shift_imm(ir);
                if amount == 0 {
                    self.shift_c = operand >> 31 != 0;
                    ((operand as i32) >> 31) as u32
                } else {
                    self.shift_c = (operand >> (amount - 1)) & 0x01 != 0;
                    ((operand as i32) >> amount) as u32
                }
            }
            5 => {
                let amount = self.op_reg(rs_idx(ir)) & 0xFF;
                if amount == 0 {
                    self.shift_c = self.c;
                    operand
                } else if amount < 32 {
                    self.shift_c = (operand >> (amount - 1)) & 0x01 != 0;
                    ((operand as i32) >> amount) as u32
                } else {
                    self.shift_c = operand >> 31 != 0;
                    ((operand as i32) >> 31) as u32
                }
            }
            6 => {
                let amount = shift_imm(ir);
                if amount == 0 {
                    // RRX
                    self.shift_c = operand & 0x01 != 0;
                    (operand >> 1) | ((self.c as u32) << 31)
                } else {
                    self.shift_c = (operand >> (amount - 1)) & 0x01 != 0;
                    operand.rotate_right(amount)
                }
            }
            _ => {
                let amount = self.op_reg(rs_idx(ir)) & 0xFF;
                if amount == 0 {
                    self.shift_c = self.c;
                    operand
                } else {
                    let amount = amount & 0x1F;
                    if amount == 0 {
                        self.shift_c = operand >> 31 != 0;
                        operand
                    } else {
                        self.shift_c = (operand >> (amount - 1)) & 0x01 != 0;
                        operand.rotate_right(amount)
                    }
                }
            }
        }
    }

    /// Index computation for register-offset addressing (mode 2). Register
    /// shift amounts are not valid here; those encodings fall to the
    /// unimplemented path.
    fn get_address_index(&mut self, ir: u32) -> Result<u32> {
        let operand = self.op_reg(rm_idx(ir));
        match (ir >> 4) & 0x07 {
            0 => Ok(operand << shift_imm(ir)),
            2 => {
                let amount = shift_imm(ir);
                Ok(if amount == 0 { 0 } else { operand >> amount })
            }
            4 => {
                let amount = shift_imm(ir);
                Ok(if amount == 0 {
                    ((operand as i32) >> 31) as u32
                } else {
                    ((operand as i32) >> amount) as u32
                })
            }
            6 => {
                let amount = shift_imm(ir);
                Ok(if amount == 0 {
                    (operand >> 1) | ((self.c as u32) << 31)
                } else {
                    operand.rotate_right(amount)
                })
            }
            _ => Err(self.unimplemented(ir)),
        }
    }

    /// Address operand for load/store word/byte (addressing mode 2),
    /// applying pre/post index writeback to Rn where the encoding demands
    /// it (DDI 0100E s5.2)
    fn get_address_operand(&mut self, ir: u32) -> Result<u32> {
        let rn = rn_idx(ir);
        // Case key is I P U . W
        let addr = match (ir >> 21) & 0x1D {
            0 | 1 => {
                // Rn -= imm (post-indexed)
                let addr = self.op_reg(rn);
                self.r[rn] = addr.wrapping_sub(imm12(ir));
                addr
            }
            4 | 5 => {
                // Rn += imm (post-indexed)
                let addr = self.op_reg(rn);
                self.r[rn] = addr.wrapping_add(imm12(ir));
                addr
            }
            8 => self.op_reg(rn).wrapping_sub(imm12(ir)),
            9 => {
                // Rn -= imm (pre-indexed)
                let addr = self.op_reg(rn).wrapping_sub(imm12(ir));
                self.r[rn] = addr;
                addr
            }
            12 => self.op_reg(rn).wrapping_add(imm12(ir)),
            13 => {
                // Rn += imm (pre-indexed)
                let addr = self.op_reg(rn).wrapping_add(imm12(ir));
                self.r[rn] = addr;
                addr
            }
            16 | 17 => {
                // Rn -= Rm (post-indexed)
                let addr = self.op_reg(rn);
                let index = self.get_address_index(ir)?;
                self.r[rn] = addr.wrapping_sub(index);
                addr
            }
            20 | 21 => {
                // Rn += Rm (post-indexed)
                let addr = self.op_reg(rn);
                let index = self.get_address_index(ir)?;
                self.r[rn] = addr.wrapping_add(index);
                addr
            }
            24 => {
                let index = self.get_address_index(ir)?;
                self.op_reg(rn).wrapping_sub(index)
            }
            25 => {
                let index = self.get_address_index(ir)?;
                let addr = self.op_reg(rn).wrapping_sub(index);
                self.r[rn] = addr;
                addr
            }
            28 => {
                let index = self.get_address_index(ir)?;
                self.op_reg(rn).wrapping_add(index)
            }
            _ => {
                // 29: Rn += Rm (pre-indexed); other keys are masked out
                let index = self.get_address_index(ir)?;
                let addr = self.op_reg(rn).wrapping_add(index);
                self.r[rn] = addr;
                addr
            }
        };
        Ok(addr)
    }

    fn unimplemented(&mut self, ir: u32) -> EmulatorError {
        self.r[15] = self.r[15].wrapping_sub(4);
        EmulatorError::Unimplemented {
            pc: self.r[15],
            opcode: ir,
        }
    }

    /// Fetch, decode and execute one instruction.
    ///
    /// Delivers a pending FIQ/IRQ first if the corresponding CPSR mask bit
    /// allows it; the handler's first instruction then executes in this
    /// same call. A failing condition consumes the slot with no side
    /// effect.
    ///
    /// # Errors
    ///
    /// [`EmulatorError::Unimplemented`] for recognised-but-unsupported
    /// encodings (coprocessor transfers, long multiply, half-word
    /// load/store). r15 is wound back to the faulting instruction.
    pub fn execute_instruction(&mut self, mem: &mut dyn ArmMemory) -> Result<()> {
        let pending = self.int_pending & !self.cpsr;
        if pending != 0 {
            if pending & CPSR_F != 0 {
                self.raise_exception(ArmException::Fiq);
            } else {
                self.raise_exception(ArmException::Irq);
            }
        }

        let ir = mem.read_long(self.r[15]);
        let pc = self.r[15].wrapping_add(4);
        self.r[15] = pc;

        let cond = match self.condition_passed(ir >> 28) {
            Some(cond) => cond,
            None => {
                self.raise_exception(ArmException::Undefined);
                return Ok(());
            }
        };
        if !cond {
            return Ok(());
        }

        match (ir >> 26) & 0x03 {
            0 => self.execute_group_0(ir, mem),
            1 => self.execute_load_store(ir, mem),
            2 => {
                if ir & 0x0200_0000 != 0 {
                    // B/BL imm24
                    let offset = sign_extend_24(ir & 0x00FF_FFFF) << 2;
                    if ir & 0x0100_0000 != 0 {
                        self.r[14] = pc; // BL
                    }
                    self.r[15] = pc.wrapping_add(4).wrapping_add(offset);
                    Ok(())
                } else {
                    self.execute_load_store_multiple(ir, mem)
                }
            }
            _ => {
                if ir & 0x0F00_0000 == 0x0F00_0000 {
                    // SWI
                    self.raise_exception(ArmException::Software);
                    Ok(())
                } else {
                    // Coprocessor transfers
                    Err(self.unimplemented(ir))
                }
            }
        }
    }

    /// Group 00: data processing, MRS/MSR/BX, multiplies, SWP, and the
    /// half-word transfer space
    fn execute_group_0(&mut self, ir: u32, mem: &mut dyn ArmMemory) -> Result<()> {
        if ir & 0x0D90_0000 == 0x0100_0000 {
            // Instructions that sit in the DP block without being data
            // processing
            match ir & 0x0FF0_00F0 {
                0x0120_0010 => {
                    // BX Rm
                    let target = self.op_reg(rm_idx(ir));
                    self.t = target & 0x01 != 0;
                    self.r[15] = target & 0xFFFF_FFFE;
                }
                0x0100_0000 => {
                    // MRS Rd, CPSR
                    let cpsr = self.get_cpsr();
                    self.r[rd_idx(ir)] = cpsr;
                }
                0x0140_0000 => {
                    // MRS Rd, SPSR
                    self.r[rd_idx(ir)] = self.spsr;
                }
                0x0120_0000 => {
                    // MSR CPSR, Rm
                    let value = self.op_reg(rm_idx(ir));
                    self.set_cpsr(value, ir);
                }
                0x0160_0000 => {
                    // MSR SPSR, Rm
                    let value = self.op_reg(rm_idx(ir));
                    self.set_spsr(value, ir);
                }
                0x0320_0000 => {
                    // MSR CPSR, imm
                    self.set_cpsr(imm8(ir).rotate_right(imm_rot(ir)), ir);
                }
                0x0360_0000 => {
                    // MSR SPSR, imm
                    self.set_spsr(imm8(ir).rotate_right(imm_rot(ir)), ir);
                }
                _ => return Err(self.unimplemented(ir)),
            }
            return Ok(());
        }

        if ir & 0x0E00_0090 == 0x0000_0090 {
            // Arithmetic extension space and half-word transfers
            return match (ir >> 5) & 0x03 {
                0 => self.execute_multiply_swp(ir, mem),
                // LDRH/STRH/LDRSB/LDRSH: recognised, not implemented
                _ => Err(self.unimplemented(ir)),
            };
        }

        self.execute_data_processing(ir)
    }

    fn execute_multiply_swp(&mut self, ir: u32, mem: &mut dyn ArmMemory) -> Result<()> {
        match (ir >> 20) & 0x1F {
            0 => {
                // MUL
                let result = self.op_reg(rm_idx(ir)).wrapping_mul(self.op_reg(rs_idx(ir)));
                self.r[rn_idx(ir)] = result;
            }
            1 => {
                // MULS
                let result = self.op_reg(rm_idx(ir)).wrapping_mul(self.op_reg(rs_idx(ir)));
                self.r[rn_idx(ir)] = result;
                self.set_nz(result);
            }
            2 => {
                // MLA
                let result = self
                    .op_reg(rm_idx(ir))
                    .wrapping_mul(self.op_reg(rs_idx(ir)))
                    .wrapping_add(self.op_reg(rd_idx(ir)));
                self.r[rn_idx(ir)] = result;
            }
            3 => {
                // MLAS
                let result = self
                    .op_reg(rm_idx(ir))
                    .wrapping_mul(self.op_reg(rs_idx(ir)))
                    .wrapping_add(self.op_reg(rd_idx(ir)));
                self.r[rn_idx(ir)] = result;
                self.set_nz(result);
            }
            8..=15 => {
                // UMULL/UMLAL/SMULL/SMLAL and flag variants
                return Err(self.unimplemented(ir));
            }
            16 => {
                // SWP: unaligned loads rotate like LDR
                let addr = self.op_reg(rn_idx(ir));
                let loaded = mem.read_long(addr).rotate_right((addr & 0x03) * 8);
                mem.write_long(addr, self.op_reg(rm_idx(ir)));
                self.r[rd_idx(ir)] = loaded;
            }
            20 => {
                // SWPB
                let addr = self.op_reg(rn_idx(ir));
                let loaded = mem.read_byte(addr);
                mem.write_byte(addr, self.op_reg(rm_idx(ir)));
                self.r[rd_idx(ir)] = loaded;
            }
            _ => return Err(self.unimplemented(ir)),
        }
        Ok(())
    }

    fn execute_data_processing(&mut self, ir: u32) -> Result<()> {
        let rd = rd_idx(ir);
        match (ir >> 20) & 0x1F {
            0 => {
                // AND
                self.r[rd] = self.op_reg(rn_idx(ir)) & self.get_shift_operand(ir);
            }
            1 => {
                // ANDS
                let result = self.get_shift_operand_s(ir) & self.op_reg(rn_idx(ir));
                self.r[rd] = result;
                if rd == 15 {
                    self.restore_cpsr();
                } else {
                    self.set_nz(result);
                    self.c = self.shift_c;
                }
            }
            2 => {
                // EOR
                self.r[rd] = self.op_reg(rn_idx(ir)) ^ self.get_shift_operand(ir);
            }
            3 => {
                // EORS
                let result = self.get_shift_operand_s(ir) ^ self.op_reg(rn_idx(ir));
                self.r[rd] = result;
                if rd == 15 {
                    self.restore_cpsr();
                } else {
                    self.set_nz(result);
                    self.c = self.shift_c;
                }
            }
            4 => {
                // SUB
                self.r[rd] = self
                    .op_reg(rn_idx(ir))
                    .wrapping_sub(self.get_shift_operand(ir));
            }
            5 => {
                // SUBS
                let op1 = self.op_reg(rn_idx(ir));
                let op2 = self.get_shift_operand(ir);
                let result = self.alu_subs(op1, op2, 0);
                self.r[rd] = result;
                if rd == 15 {
                    self.restore_cpsr();
                }
            }
            6 => {
                // RSB
                self.r[rd] = self
                    .get_shift_operand(ir)
                    .wrapping_sub(self.op_reg(rn_idx(ir)));
            }
            7 => {
                // RSBS
                let op1 = self.get_shift_operand(ir);
                let op2 = self.op_reg(rn_idx(ir));
                let result = self.alu_subs(op1, op2, 0);
                self.r[rd] = result;
                if rd == 15 {
                    self.restore_cpsr();
                }
            }
            8 => {
                // ADD
                self.r[rd] = self
                    .op_reg(rn_idx(ir))
                    .wrapping_add(self.get_shift_operand(ir));
            }
            9 => {
                // ADDS
                let op1 = self.get_shift_operand(ir);
                let op2 = self.op_reg(rn_idx(ir));
                let result = self.alu_adds(op1, op2, 0);
                self.r[rd] = result;
                if rd == 15 {
                    self.restore_cpsr();
                }
            }
            10 => {
                // ADC
                self.r[rd] = self
                    .op_reg(rn_idx(ir))
                    .wrapping_add(self.get_shift_operand(ir))
                    .wrapping_add(self.c as u32);
            }
            11 => {
                // ADCS
                let op1 = self.get_shift_operand(ir);
                let op2 = self.op_reg(rn_idx(ir));
                let carry_in = self.c as u32;
                let result = self.alu_adds(op1, op2, carry_in);
                self.r[rd] = result;
                if rd == 15 {
                    self.restore_cpsr();
                }
            }
            12 => {
                // SBC
                self.r[rd] = self
                    .op_reg(rn_idx(ir))
                    .wrapping_sub(self.get_shift_operand(ir))
                    .wrapping_sub(!self.c as u32);
            }
            13 => {
                // SBCS
                let op1 = self.op_reg(rn_idx(ir));
                let op2 = self.get_shift_operand(ir);
                let borrow_in = !self.c as u32;
                let result = self.alu_subs(op1, op2, borrow_in);
                self.r[rd] = result;
                if rd == 15 {
                    self.restore_cpsr();
                }
            }
            14 => {
                // RSC
                self.r[rd] = self
                    .get_shift_operand(ir)
                    .wrapping_sub(self.op_reg(rn_idx(ir)))
                    .wrapping_sub(!self.c as u32);
            }
            15 => {
                // RSCS
                let op1 = self.get_shift_operand(ir);
                let op2 = self.op_reg(rn_idx(ir));
                let borrow_in = !self.c as u32;
                let result = self.alu_subs(op1, op2, borrow_in);
                self.r[rd] = result;
                if rd == 15 {
                    self.restore_cpsr();
                }
            }
            17 => {
                // TST
                let result = self.get_shift_operand_s(ir) & self.op_reg(rn_idx(ir));
                self.set_nz(result);
                self.c = self.shift_c;
            }
            19 => {
                // TEQ
                let result = self.get_shift_operand_s(ir) ^ self.op_reg(rn_idx(ir));
                self.set_nz(result);
                self.c = self.shift_c;
            }
            21 => {
                // CMP
                let op1 = self.op_reg(rn_idx(ir));
                let op2 = self.get_shift_operand(ir);
                self.alu_subs(op1, op2, 0);
            }
            23 => {
                // CMN
                let op1 = self.op_reg(rn_idx(ir));
                let op2 = self.get_shift_operand(ir);
                self.alu_adds(op1, op2, 0);
            }
            24 => {
                // ORR
                self.r[rd] = self.op_reg(rn_idx(ir)) | self.get_shift_operand(ir);
            }
            25 => {
                // ORRS
                let result = self.get_shift_operand_s(ir) | self.op_reg(rn_idx(ir));
                self.r[rd] = result;
                if rd == 15 {
                    self.restore_cpsr();
                } else {
                    self.set_nz(result);
                    self.c = self.shift_c;
                }
            }
            26 => {
                // MOV
                self.r[rd] = self.get_shift_operand(ir);
            }
            27 => {
                // MOVS
                let result = self.get_shift_operand_s(ir);
                self.r[rd] = result;
                if rd == 15 {
                    self.restore_cpsr();
                } else {
                    self.set_nz(result);
                    self.c = self.shift_c;
                }
            }
            28 => {
                // BIC
                self.r[rd] = self.op_reg(rn_idx(ir)) & !self.get_shift_operand(ir);
            }
            29 => {
                // BICS
                let result = self.op_reg(rn_idx(ir)) & !self.get_shift_operand_s(ir);
                self.r[rd] = result;
                if rd == 15 {
                    self.restore_cpsr();
                } else {
                    self.set_nz(result);
                    self.c = self.shift_c;
                }
            }
            _ => return Err(self.unimplemented(ir)),
        }
        Ok(())
    }

    fn execute_load_store(&mut self, ir: u32, mem: &mut dyn ArmMemory) -> Result<()> {
        let address = self.get_address_operand(ir)?;
        let rd = rd_idx(ir);
        match (ir >> 20) & 0x17 {
            0 | 16 | 18 => mem.write_long(address, self.op_reg(rd)), // STR
            1 | 17 | 19 => self.r[rd] = mem.read_long(address),      // LDR
            2 => mem.write_long(address, self.op_reg(rd)),           // STRT
            3 => self.r[rd] = mem.read_long(address),                // LDRT
            4 | 20 | 22 => mem.write_byte(address, self.op_reg(rd)), // STRB
            5 | 21 | 23 => self.r[rd] = mem.read_byte(address),      // LDRB
            6 => mem.write_byte(address, self.op_reg(rd)),           // STRBT
            _ => self.r[rd] = mem.read_byte(address),                // LDRBT
        }
        Ok(())
    }

    fn execute_load_store_multiple(&mut self, ir: u32, mem: &mut dyn ArmMemory) -> Result<()> {
        let rn = rn_idx(ir);
        let mut operand = self.op_reg(rn);

        match (ir & 0x01D0_0000) >> 20 {
            0 => {
                // STMDA
                for i in (0..16).rev() {
                    if ir & (1 << i) != 0 {
                        mem.write_long(operand, self.r[i]);
                        operand = operand.wrapping_sub(4);
                    }
                }
            }
            1 => {
                // LDMDA
                for i in (0..16).rev() {
                    if ir & (1 << i) != 0 {
                        self.r[i] = mem.read_long(operand);
                        operand = operand.wrapping_sub(4);
                    }
                }
            }
            4 => {
                // STMDA (S)
                for i in (0..16).rev() {
                    if ir & (1 << i) != 0 {
                        mem.write_long(operand, self.user_reg(i));
                        operand = operand.wrapping_sub(4);
                    }
                }
            }
            5 => {
                // LDMDA (S)
                if ir & 0x0000_8000 != 0 {
                    for i in (0..16).rev() {
                        if ir & (1 << i) != 0 {
                            self.r[i] = mem.read_long(operand);
                            operand = operand.wrapping_sub(4);
                        }
                    }
                    self.restore_cpsr();
                } else {
                    for i in (0..16).rev() {
                        if ir & (1 << i) != 0 {
                            let value = mem.read_long(operand);
                            self.set_user_reg(i, value);
                            operand = operand.wrapping_sub(4);
                        }
                    }
                }
            }
            8 => {
                // STMIA
                for i in 0..16 {
                    if ir & (1 << i) != 0 {
                        mem.write_long(operand, self.r[i]);
                        operand = operand.wrapping_add(4);
                    }
                }
            }
            9 => {
                // LDMIA
                for i in 0..16 {
                    if ir & (1 << i) != 0 {
                        self.r[i] = mem.read_long(operand);
                        operand = operand.wrapping_add(4);
                    }
                }
            }
            12 => {
                // STMIA (S)
                for i in 0..16 {
                    if ir & (1 << i) != 0 {
                        mem.write_long(operand, self.user_reg(i));
                        operand = operand.wrapping_add(4);
                    }
                }
            }
            13 => {
                // LDMIA (S)
                if ir & 0x0000_8000 != 0 {
                    for i in 0..16 {
                        if ir & (1 << i) != 0 {
                            self.r[i] = mem.read_long(operand);
                            operand = operand.wrapping_add(4);
                        }
                    }
                    self.restore_cpsr();
                } else {
                    for i in 0..16 {
                        if ir & (1 << i) != 0 {
                            let value = mem.read_long(operand);
                            self.set_user_reg(i, value);
                            operand = operand.wrapping_add(4);
                        }
                    }
                }
            }
            16 => {
                // STMDB
                for i in (0..16).rev() {
                    if ir & (1 << i) != 0 {
                        operand = operand.wrapping_sub(4);
                        mem.write_long(operand, self.r[i]);
                    }
                }
            }
            17 => {
                // LDMDB
                for i in (0..16).rev() {
                    if ir & (1 << i) != 0 {
                        operand = operand.wrapping_sub(4);
                        self.r[i] = mem.read_long(operand);
                    }
                }
            }
            20 => {
                // STMDB (S)
                for i in (0..16).rev() {
                    if ir & (1 << i) != 0 {
                        operand = operand.wrapping_sub(4);
                        mem.write_long(operand, self.user_reg(i));
                    }
                }
            }
            21 => {
                // LDMDB (S)
                if ir & 0x0000_8000 != 0 {
                    for i in (0..16).rev() {
                        if ir & (1 << i) != 0 {
                            operand = operand.wrapping_sub(4);
                            self.r[i] = mem.read_long(operand);
                        }
                    }
                    self.restore_cpsr();
                } else {
                    for i in (0..16).rev() {
                        if ir & (1 << i) != 0 {
                            operand = operand.wrapping_sub(4);
                            let value = mem.read_long(operand);
                            self.set_user_reg(i, value);
                        }
                    }
                }
            }
            24 => {
                // STMIB
                for i in 0..16 {
                    if ir & (1 << i) != 0 {
                        operand = operand.wrapping_add(4);
                        mem.write_long(operand, self.r[i]);
                    }
                }
            }
            25 => {
                // LDMIB
                for i in 0..16 {
                    if ir & (1 << i) != 0 {
                        operand = operand.wrapping_add(4);
                        self.r[i] = mem.read_long(operand);
                    }
                }
            }
            28 => {
                // STMIB (S)
                for i in 0..16 {
                    if ir & (1 << i) != 0 {
                        operand = operand.wrapping_add(4);
                        mem.write_long(operand, self.user_reg(i));
                    }
                }
            }
            _ => {
                // 29: LDMIB (S)
                if ir & 0x0000_8000 != 0 {
                    for i in 0..16 {
                        if ir & (1 << i) != 0 {
                            operand = operand.wrapping_add(4);
                            self.r[i] = mem.read_long(operand);
                        }
                    }
                    self.restore_cpsr();
                } else {
                    for i in 0..16 {
                        if ir & (1 << i) != 0 {
                            operand = operand.wrapping_add(4);
                            let value = mem.read_long(operand);
                            self.set_user_reg(i, value);
                        }
                    }
                }
            }
        }

        if ir & 0x0020_0000 != 0 {
            self.r[rn] = operand;
        }
        Ok(())
    }

    /// Execute up to `cycles` instructions, stopping early on a breakpoint
    /// (when debug mode is enabled). Returns the cycles actually executed.
    ///
    /// # Errors
    ///
    /// Propagates [`EmulatorError::Unimplemented`] from the executed
    /// instructions; the caller treats it as fatal.
    pub fn run_cycles(&mut self, cycles: u32, mem: &mut dyn ArmMemory) -> Result<u32> {
        for done in 0..cycles {
            self.icount += 1;
            self.execute_instruction(mem)?;
            if self.debug_mode && self.check_breakpoints() {
                return Ok(done + 1);
            }
        }
        Ok(cycles)
    }
}
