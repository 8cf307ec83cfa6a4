use crate::error::{ParseError, ParseResult};
use crate::instruction::{Condition, Instruction};
use crate::lexer::{Lexer, SourceLoc, Token};
use crate::operand::{MemExpr, Operand, Register};

/// An assembled program: its instruction stream, indexed by program counter,
/// and the initial data image copied into RAM at address 0 before execution
/// (spec §3).
#[derive(Clone, Debug, Default)]
pub struct Program {
    pub instructions: Vec<Instruction>,
    pub data: Vec<i64>,
}

/// Hand-written recursive-descent parser with one token of lookahead,
/// grounded directly on the original reference implementation's `Parser`
/// class (`original_source/t86-cli/parser.h`).
pub struct Parser<'a> {
    lex: Lexer<'a>,
    cur: Token,
}

impl<'a> Parser<'a> {
    pub fn new(input: &'a str) -> ParseResult<Parser<'a>> {
        let mut lex = Lexer::new(input);
        let cur = lex.next_token()?;
        Ok(Parser { lex, cur })
    }

    fn loc(&self) -> SourceLoc {
        self.lex.loc()
    }

    fn advance(&mut self) -> ParseResult<Token> {
        let prev = self.cur.clone();
        self.cur = self.lex.next_token()?;
        Ok(prev)
    }

    fn expect(&mut self, expected: Token, what: &str) -> ParseResult<()> {
        if self.cur != expected {
            return Err(ParseError::new(
                self.loc(),
                format!("{}, found {}", what, self.cur),
            ));
        }
        self.advance()?;
        Ok(())
    }

    fn err(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(self.loc(), message)
    }

    fn parse_register(&self, name: &str) -> ParseResult<Register> {
        match name {
            "BP" => Ok(Register::Bp),
            "SP" => Ok(Register::Sp),
            "IP" => Ok(Register::Ip),
            _ => {
                if let Some(digits) = name.strip_prefix('R') {
                    digits
                        .parse::<u32>()
                        .map(Register::Numbered)
                        .map_err(|_| self.err(format!("invalid register name '{}'", name)))
                } else {
                    Err(self.err(format!(
                        "registers must begin with 'R', unless IP, BP or SP, got '{}'",
                        name
                    )))
                }
            }
        }
    }

    fn parse_float_register(&self, name: &str) -> ParseResult<u32> {
        name.strip_prefix("FR")
            .ok_or_else(|| self.err(format!("float registers must begin with 'FR', got '{}'", name)))?
            .parse::<u32>()
            .map_err(|_| self.err(format!("invalid float register name '{}'", name)))
    }

    fn is_float_register_name(name: &str) -> bool {
        name.starts_with("FR")
    }

    /// Parses one `Operand` per spec §4.3's grammar, including the bracketed
    /// `MemBody` forms and the bare `ID '+' NUM` shorthand, which the original
    /// parser resolves identically to `[ID + NUM]` (both build a `MemExpr`
    /// with that register as base).
    fn operand(&mut self) -> ParseResult<Operand> {
        match self.cur {
            Token::Id => {
                let name = self.lex.id().to_string();
                self.advance()?;

                if self.cur == Token::Plus {
                    self.advance()?;
                    if self.cur != Token::Num {
                        return Err(self.err("after 'Reg +' there can only be a number"));
                    }
                    let imm = self.lex.number();
                    self.advance()?;
                    let reg = self.parse_register(&name)?;
                    return Ok(Operand::Mem(MemExpr::with_base(reg).plus_disp(imm)));
                }

                if Self::is_float_register_name(&name) {
                    Ok(Operand::FReg(self.parse_float_register(&name)?))
                } else {
                    Ok(Operand::Reg(self.parse_register(&name)?))
                }
            }
            Token::Num => {
                let value = self.lex.number();
                self.advance()?;
                Ok(Operand::Imm(value))
            }
            Token::NumFloat => {
                let value = self.lex.float_number();
                self.advance()?;
                Ok(Operand::FloatImm(value))
            }
            Token::LBracket => self.mem_operand(),
            _ => Err(self.err(format!("expected an operand, found {}", self.cur))),
        }
    }

    fn mem_operand(&mut self) -> ParseResult<Operand> {
        self.advance()?; // '['
        let loc = self.loc();

        if self.cur == Token::Num {
            let disp = self.lex.number();
            self.advance()?;
            self.expect(Token::RBracket, "expected ']' to close [Imm]")?;
            return Ok(Operand::Mem(MemExpr::with_disp(disp)));
        }

        if self.cur != Token::Id {
            return Err(self.err("expected a register or immediate inside '[...]'"));
        }
        let name = self.lex.id().to_string();
        let reg = self.parse_register(&name)?;
        self.advance()?;

        if self.cur == Token::RBracket {
            self.advance()?;
            return Ok(Operand::Mem(MemExpr::with_base(reg)));
        }

        if self.cur == Token::Times {
            self.advance()?;
            if self.cur != Token::Num {
                return Err(self.err("after '[Reg * ...]' there must be an immediate"));
            }
            let scale = self.lex.number();
            self.advance()?;
            self.expect(Token::RBracket, "expected ']' to close dereference")?;
            return Ok(Operand::Mem(MemExpr::new().plus_index(reg, scale, loc)?));
        }

        if self.cur != Token::Plus {
            return Err(self.err("expected '+', '*' or ']' after register"));
        }
        self.advance()?;

        if self.cur == Token::Id {
            let name2 = self.lex.id().to_string();
            let reg2 = self.parse_register(&name2)?;
            self.advance()?;

            if self.cur == Token::RBracket {
                self.advance()?;
                return Ok(Operand::Mem(
                    MemExpr::with_base(reg).plus_index(reg2, 1, loc)?,
                ));
            }
            if self.cur == Token::Times {
                self.advance()?;
                self.expect_token_with(Token::Num, "expected an immediate in '[Reg + Reg * Imm]'")?;
                let scale = self.lex.number();
                self.advance()?;
                self.expect(Token::RBracket, "expected ']' to close '[Reg + Reg * Imm]'")?;
                return Ok(Operand::Mem(
                    MemExpr::with_base(reg).plus_index(reg2, scale, loc)?,
                ));
            }
            return Err(self.err("expected '*' or ']' after '[Reg + Reg'"));
        }

        if self.cur == Token::Num {
            let disp = self.lex.number();
            self.advance()?;
            if self.cur == Token::RBracket {
                self.advance()?;
                return Ok(Operand::Mem(MemExpr::with_base(reg).plus_disp(disp)));
            }
            if self.cur != Token::Plus {
                return Err(self.err("dereference of the form '[R1 + i ...]' must be followed by '+ R'"));
            }
            self.advance()?;
            self.expect_token_with(Token::Id, "expected a register after '[R1 + i +'")?;
            let name2 = self.lex.id().to_string();
            let reg2 = self.parse_register(&name2)?;
            self.advance()?;

            if self.cur == Token::RBracket {
                self.advance()?;
                return Ok(Operand::Mem(
                    MemExpr::with_base(reg).plus_disp(disp).plus_index(reg2, 1, loc)?,
                ));
            }
            self.expect(Token::Times, "after '[R1 + i + R2' there must be '*' or ']'")?;
            self.expect_token_with(Token::Num, "after '[R1 + i + R2 *' there must be an immediate")?;
            let scale = self.lex.number();
            self.advance()?;
            self.expect(Token::RBracket, "expected ']' to close dereference")?;
            return Ok(Operand::Mem(
                MemExpr::with_base(reg).plus_disp(disp).plus_index(reg2, scale, loc)?,
            ));
        }

        Err(self.err("expected a register or immediate after '[Reg +'"))
    }

    fn expect_token_with(&self, expected: Token, message: &str) -> ParseResult<()> {
        if self.cur != expected {
            return Err(self.err(message));
        }
        Ok(())
    }

    fn register_operand(&mut self) -> ParseResult<Register> {
        let op = self.operand()?;
        op.as_register()
            .ok_or_else(|| self.err(format!("expected a register, found {}", op.type_name())))
    }

    fn float_register_operand(&mut self) -> ParseResult<u32> {
        let op = self.operand()?;
        op.as_float_register()
            .ok_or_else(|| self.err(format!("expected a float register, found {}", op.type_name())))
    }

    fn comma(&mut self) -> ParseResult<()> {
        self.expect(Token::Comma, "expected ',' to separate operands")
    }

    /// Parses one instruction, including its optional leading numeric address
    /// label (discarded, per spec §9's open-question resolution).
    fn instruction(&mut self) -> ParseResult<Instruction> {
        if self.cur == Token::Num {
            self.advance()?;
        }

        if self.cur != Token::Id {
            return Err(self.err("expected an instruction mnemonic"));
        }
        let loc = self.loc();
        let name = self.lex.id().to_string();
        self.advance()?;

        let instr = match name.as_str() {
            "MOV" => {
                let dest = self.operand()?;
                self.comma()?;
                let src = self.operand()?;
                Instruction::Mov(dest, src)
            }
            "ADD" => self.binary_reg_op(Instruction::Add)?,
            "SUB" => self.binary_reg_op(Instruction::Sub)?,
            "MUL" => self.binary_reg_op(Instruction::Mul)?,
            "DIV" => self.binary_reg_op(Instruction::Div)?,
            "MOD" => self.binary_reg_op(Instruction::Mod)?,
            "IMUL" => self.binary_reg_op(Instruction::Imul)?,
            "IDIV" => self.binary_reg_op(Instruction::Idiv)?,
            "AND" => self.binary_reg_op(Instruction::And)?,
            "OR" => self.binary_reg_op(Instruction::Or)?,
            "XOR" => self.binary_reg_op(Instruction::Xor)?,
            "LSH" => self.binary_reg_op(Instruction::Lsh)?,
            "RSH" => self.binary_reg_op(Instruction::Rsh)?,
            "CMP" => self.binary_reg_op(Instruction::Cmp)?,
            "LEA" => {
                let dest = self.register_operand()?;
                self.comma()?;
                let src = self.operand()?;
                Instruction::Lea(Operand::Reg(dest), src)
            }
            "INC" => Instruction::Inc(Operand::Reg(self.register_operand()?)),
            "DEC" => Instruction::Dec(Operand::Reg(self.register_operand()?)),
            "NEG" => Instruction::Neg(Operand::Reg(self.register_operand()?)),
            "NOT" => Instruction::Not(self.operand()?),
            "FCMP" => {
                let dest = self.float_register_operand()?;
                self.comma()?;
                let from = self.operand()?;
                if !(from.is_float_value() || from.is_float_register()) {
                    return Err(self.err("FCMP requires a float value or float register operand"));
                }
                Instruction::FCmp(Operand::FReg(dest), from)
            }
            "JMP" => Instruction::Jmp(self.operand()?),
            "LOOP" => {
                let counter = self.register_operand()?;
                self.comma()?;
                let target = self.operand()?;
                Instruction::Loop(Operand::Reg(counter), target)
            }
            "CALL" => Instruction::Call(self.operand()?),
            "RET" => Instruction::Ret,
            "HALT" => Instruction::Halt,
            "BREAK" => Instruction::Break,
            "NOP" => Instruction::Nop,
            "PUSH" => Instruction::Push(self.operand()?),
            "POP" => Instruction::Pop(Operand::Reg(self.register_operand()?)),
            "FPUSH" => Instruction::FPush(self.operand()?),
            "FPOP" => Instruction::FPop(Operand::FReg(self.float_register_operand()?)),
            "GETCHAR" => Instruction::GetChar(Operand::Reg(self.register_operand()?)),
            "PUTCHAR" => Instruction::PutChar(Operand::Reg(self.register_operand()?)),
            "PUTNUM" => Instruction::PutNum(Operand::Reg(self.register_operand()?)),
            "FADD" => self.binary_freg_op(Instruction::FAdd)?,
            "FSUB" => self.binary_freg_op(Instruction::FSub)?,
            "FMUL" => self.binary_freg_op(Instruction::FMul)?,
            "FDIV" => self.binary_freg_op(Instruction::FDiv)?,
            "EXT" => {
                let dest = self.float_register_operand()?;
                self.comma()?;
                let src = self.register_operand()?;
                Instruction::Ext(Operand::FReg(dest), Operand::Reg(src))
            }
            "NRW" => {
                let dest = self.register_operand()?;
                self.comma()?;
                let src = self.float_register_operand()?;
                Instruction::Nrw(Operand::Reg(dest), Operand::FReg(src))
            }
            "DBG" => return Err(self.err("DBG instruction is not supported")),
            "CLF" => return Err(self.err("CLF instruction is not implemented")),
            _ => {
                if let Some(cond) = Condition::from_mnemonic(&name) {
                    Instruction::Jcc(cond, self.operand()?)
                } else {
                    return Err(self.err(format!("unknown instruction '{}'", name)));
                }
            }
        };

        instr.validate(loc)?;
        Ok(instr)
    }

    fn binary_reg_op(
        &mut self,
        make: fn(Operand, Operand) -> Instruction,
    ) -> ParseResult<Instruction> {
        let dest = self.register_operand()?;
        self.comma()?;
        let src = self.operand()?;
        Ok(make(Operand::Reg(dest), src))
    }

    fn binary_freg_op(
        &mut self,
        make: fn(Operand, Operand) -> Instruction,
    ) -> ParseResult<Instruction> {
        let dest = self.float_register_operand()?;
        self.comma()?;
        let src = self.operand()?;
        Ok(make(Operand::FReg(dest), src))
    }

    fn text_section(&mut self, program: &mut Program) -> ParseResult<()> {
        while self.cur == Token::Num || self.cur == Token::Id {
            program.instructions.push(self.instruction()?);
        }
        Ok(())
    }

    fn data_section(&mut self, program: &mut Program) -> ParseResult<()> {
        while self.cur == Token::Num || self.cur == Token::Id {
            if self.cur == Token::Num {
                self.advance()?;
            }
            if self.cur != Token::Id || self.lex.id() != "DW" {
                return Err(self.err("expected 'DW'"));
            }
            self.advance()?;

            if self.cur != Token::Num {
                return Err(self.err("expected a number after 'DW'"));
            }
            let word = self.lex.number();
            self.advance()?;

            let mut rep_count = 1i64;
            if self.cur == Token::Times {
                self.advance()?;
                if self.cur != Token::Num {
                    return Err(self.err("expected a number after '*'"));
                }
                rep_count = self.lex.number();
                self.advance()?;
            }

            for _ in 0..rep_count {
                program.data.push(word);
            }
        }
        Ok(())
    }

    fn section(&mut self, program: &mut Program) -> ParseResult<()> {
        if self.cur != Token::Id {
            return Err(self.err("expected a section name after '.'"));
        }
        let name = self.lex.id().to_string();
        self.advance()?;
        match name.as_str() {
            "text" => self.text_section(program),
            "data" => self.data_section(program),
            _ => Err(self.err(format!("invalid section name '.{}'", name))),
        }
    }

    /// Parses the full input into a [`Program`].
    pub fn parse(&mut self) -> ParseResult<Program> {
        let mut program = Program::default();

        if self.cur != Token::Dot {
            return Err(self.err("file does not contain any section"));
        }
        while self.cur == Token::Dot {
            self.advance()?;
            self.section(&mut program)?;
        }
        self.expect(Token::End, "expected end of file")?;
        Ok(program)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> Program {
        Parser::new(src).unwrap().parse().unwrap()
    }

    #[test]
    fn mem_expr_with_base_index_scale_and_disp() {
        let program = parse(".text\nMOV R0, [R1+2+R2*4]");
        match program.instructions[0] {
            Instruction::Mov(_, Operand::Mem(mem)) => {
                assert_eq!(mem.base, Some(Register::Numbered(1)));
                assert_eq!(mem.index, Some(Register::Numbered(2)));
                assert_eq!(mem.scale, 4);
                assert_eq!(mem.disp, 2);
            }
            other => panic!("unexpected instruction {:?}", other),
        }
    }

    #[test]
    fn bracketed_immediate_is_mem_with_disp_only() {
        let program = parse(".text\nMOV R0, [1]");
        assert_eq!(
            program.instructions[0],
            Instruction::Mov(
                Operand::Reg(Register::Numbered(0)),
                Operand::Mem(MemExpr::with_disp(1)),
            )
        );
    }

    #[test]
    fn data_section_expands_repeat_count() {
        let program = parse(".data\nDW 7 * 3");
        assert_eq!(program.data, vec![7, 7, 7]);
    }

    #[test]
    fn leading_address_label_is_discarded() {
        let program = parse(".text\n10 MOV R0, 5");
        assert_eq!(
            program.instructions[0],
            Instruction::Mov(Operand::Reg(Register::Numbered(0)), Operand::Imm(5))
        );
    }

    #[test]
    fn dbg_is_rejected() {
        let err = Parser::new(".text\nDBG").unwrap().parse().unwrap_err();
        assert!(err.message.contains("DBG"));
    }

    #[test]
    fn clf_is_rejected() {
        let err = Parser::new(".text\nCLF").unwrap().parse().unwrap_err();
        assert!(err.message.contains("CLF"));
    }

    #[test]
    fn unknown_opcode_is_a_parse_error() {
        assert!(Parser::new(".text\nFROB R0").unwrap().parse().is_err());
    }

    #[test]
    fn bare_reg_plus_imm_is_a_memory_dereference() {
        let program = parse(".text\nMOV R0, R1 + 4");
        assert_eq!(
            program.instructions[0],
            Instruction::Mov(
                Operand::Reg(Register::Numbered(0)),
                Operand::Mem(MemExpr::with_base(Register::Numbered(1)).plus_disp(4)),
            )
        );
    }

    #[test]
    fn jcc_mnemonic_parses_to_jcc_instruction() {
        let program = parse(".text\nJE 5");
        assert_eq!(
            program.instructions[0],
            Instruction::Jcc(Condition::E, Operand::Imm(5))
        );
    }
}
