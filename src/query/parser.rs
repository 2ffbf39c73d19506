//! Recursive-descent parser with one-token lookahead.
//!
//! Produces a [`QueryTree`](super::tree::QueryTree) whose shape follows the
//! invariants in the data model: PROJECT-over-SORT-over-FILTER-over-JOIN for
//! SELECT, dedicated node types for IN/EXISTS/BETWEEN/IS-NULL/LIKE, and
//! n-ary OPERATOR("AND"/"OR") nodes for boolean expressions.

use super::tokenizer::{Token, TokenKind, Tokenizer};
use super::tree::{NodeType, QueryTree, NodeRef};
use crate::error::DbError;

pub fn parse(sql: &str) -> Result<NodeRef, DbError> {
    let tokens = Tokenizer::new(sql).tokenize()?;
    if tokens.len() == 1 {
        return Err(DbError::Parse { message: "empty input".into(), line: 1, column: 1 });
    }
    let mut parser = Parser { tokens, pos: 0 };
    let node = parser.parse_statement()?;
    Ok(node)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn advance(&mut self) -> Token {
        let t = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        t
    }

    fn err(&self, message: impl Into<String>) -> DbError {
        let t = self.peek();
        DbError::Parse { message: message.into(), line: t.line, column: t.column }
    }

    fn is_keyword(&self, kw: &str) -> bool {
        matches!(&self.peek().kind, TokenKind::Keyword(k) if k == kw)
    }

    fn eat_keyword(&mut self, kw: &str) -> Result<(), DbError> {
        if self.is_keyword(kw) {
            self.advance();
            Ok(())
        } else {
            Err(self.err(format!("expected keyword {kw}")))
        }
    }

    fn eat(&mut self, kind: &TokenKind) -> Result<(), DbError> {
        if &self.peek().kind == kind {
            self.advance();
            Ok(())
        } else {
            Err(self.err(format!("expected {kind:?}")))
        }
    }

    fn parse_statement(&mut self) -> Result<NodeRef, DbError> {
        if self.is_keyword("SELECT") {
            self.parse_select()
        } else if self.is_keyword("INSERT INTO") {
            self.parse_insert()
        } else if self.is_keyword("UPDATE") {
            self.parse_update()
        } else if self.is_keyword("DELETE") {
            self.parse_delete()
        } else if self.is_keyword("CREATE TABLE") {
            self.parse_create_table()
        } else if self.is_keyword("DROP TABLE") {
            self.parse_drop_table()
        } else if self.is_keyword("BEGIN TRANSACTION") {
            self.parse_begin_transaction()
        } else if self.is_keyword("COMMIT") {
            self.advance();
            let _ = self.eat(&TokenKind::Semicolon);
            Ok(QueryTree::new(NodeType::Commit, "COMMIT"))
        } else if self.is_keyword("ABORT") {
            self.advance();
            let _ = self.eat(&TokenKind::Semicolon);
            Ok(QueryTree::new(NodeType::Commit, "ABORT"))
        } else {
            Err(self.err("unexpected token at start of statement"))
        }
    }

    fn parse_begin_transaction(&mut self) -> Result<NodeRef, DbError> {
        self.advance();
        let _ = self.eat(&TokenKind::Semicolon);
        let node = QueryTree::new(NodeType::BeginTransaction, "BEGIN TRANSACTION");
        loop {
            if self.is_keyword("COMMIT") {
                self.advance();
                let _ = self.eat(&TokenKind::Semicolon);
                return Ok(node);
            }
            if matches!(self.peek().kind, TokenKind::Eof) {
                return Err(self.err("transaction block not terminated by COMMIT"));
            }
            let stmt = self.parse_statement()?;
            QueryTree::push_child(&node, stmt);
        }
    }

    // ---- SELECT ----

    fn parse_select(&mut self) -> Result<NodeRef, DbError> {
        self.advance();
        let star_or_cols = self.parse_select_list()?;
        self.eat_keyword("FROM")?;
        let mut source = self.parse_table_ref()?;

        while self.is_keyword("JOIN") || self.is_keyword("INNER") || self.is_keyword("NATURAL") {
            source = self.parse_join(source)?;
        }
        while matches!(self.peek().kind, TokenKind::Comma) {
            self.advance();
            let right = self.parse_table_ref()?;
            let join = QueryTree::new(NodeType::Join, "CROSS");
            QueryTree::push_child(&join, source);
            QueryTree::push_child(&join, right);
            source = join;
        }

        if self.is_keyword("WHERE") {
            self.advance();
            let cond = self.parse_bool_expr()?;
            let filter = QueryTree::new(NodeType::Filter, "WHERE");
            QueryTree::push_child(&filter, source);
            QueryTree::push_child(&filter, cond);
            source = filter;
        }

        if self.is_keyword("ORDER BY") {
            self.advance();
            let expr = self.parse_arith_expr()?;
            let mut direction = "ASC".to_string();
            if self.is_keyword("ASC") {
                self.advance();
            } else if self.is_keyword("DESC") {
                self.advance();
                direction = "DESC".into();
            }
            let sort = QueryTree::new(NodeType::Sort, direction);
            QueryTree::push_child(&sort, expr);
            QueryTree::push_child(&sort, source);
            source = sort;
        }

        let project = QueryTree::new(NodeType::Project, star_or_cols.0);
        for col in star_or_cols.1 {
            QueryTree::push_child(&project, col);
        }
        QueryTree::push_child(&project, source);
        let mut result = project;

        if self.is_keyword("LIMIT") {
            self.advance();
            let n = self.expect_number()?;
            let limit = QueryTree::new(NodeType::Limit, n);
            QueryTree::push_child(&limit, result);
            result = limit;
        }

        let _ = self.eat(&TokenKind::Semicolon);
        Ok(result)
    }

    fn parse_select_list(&mut self) -> Result<(String, Vec<NodeRef>), DbError> {
        if let TokenKind::Arithmetic(op) = &self.peek().kind {
            if op == "*" {
                self.advance();
                return Ok(("*".to_string(), Vec::new()));
            }
        }
        let mut cols = vec![self.parse_column_ref()?];
        while matches!(self.peek().kind, TokenKind::Comma) {
            self.advance();
            cols.push(self.parse_column_ref()?);
        }
        Ok((String::new(), cols))
    }

    fn parse_column_ref(&mut self) -> Result<NodeRef, DbError> {
        let name = self.expect_identifier()?;
        let node = QueryTree::new(NodeType::ColumnRef, "");
        let (table, col) = match name.split_once('.') {
            Some((t, c)) => (Some(t.to_string()), c.to_string()),
            None => (None, name),
        };
        QueryTree::push_child(&node, QueryTree::new(NodeType::ColumnName, col));
        if let Some(t) = table {
            QueryTree::push_child(&node, QueryTree::new(NodeType::TableName, t));
        }
        if self.is_keyword("AS") {
            self.advance();
            let alias = self.expect_identifier()?;
            let alias_node = QueryTree::new(NodeType::Alias, alias);
            QueryTree::push_child(&alias_node, node);
            return Ok(alias_node);
        }
        if let TokenKind::Identifier(alias) = self.peek().kind.clone() {
            self.advance();
            let alias_node = QueryTree::new(NodeType::Alias, alias);
            QueryTree::push_child(&alias_node, node);
            return Ok(alias_node);
        }
        Ok(node)
    }

    fn parse_table_ref(&mut self) -> Result<NodeRef, DbError> {
        let name = self.expect_identifier()?;
        let rel = QueryTree::new(NodeType::Relation, name);
        if self.is_keyword("AS") {
            self.advance();
            let alias = self.expect_identifier()?;
            let alias_node = QueryTree::new(NodeType::Alias, alias);
            QueryTree::push_child(&alias_node, rel);
            return Ok(alias_node);
        }
        if let TokenKind::Identifier(alias) = self.peek().kind.clone() {
            self.advance();
            let alias_node = QueryTree::new(NodeType::Alias, alias);
            QueryTree::push_child(&alias_node, rel);
            return Ok(alias_node);
        }
        Ok(rel)
    }

    fn parse_join(&mut self, left: NodeRef) -> Result<NodeRef, DbError> {
        if self.is_keyword("NATURAL") {
            self.advance();
            self.eat_keyword("JOIN")?;
            let right = self.parse_table_ref()?;
            let join = QueryTree::new(NodeType::Join, "NATURAL");
            QueryTree::push_child(&join, left);
            QueryTree::push_child(&join, right);
            return Ok(join);
        }
        if self.is_keyword("INNER") {
            self.advance();
        }
        self.eat_keyword("JOIN")?;
        let right = self.parse_table_ref()?;
        if self.is_keyword("ON") {
            self.advance();
            let cond = self.parse_bool_expr()?;
            let join = QueryTree::new(NodeType::Join, "INNER");
            QueryTree::push_child(&join, left);
            QueryTree::push_child(&join, right);
            QueryTree::push_child(&join, cond);
            Ok(join)
        } else {
            Err(self.err("JOIN missing both NATURAL and ON"))
        }
    }

    // ---- boolean / arithmetic expressions ----

    fn parse_bool_expr(&mut self) -> Result<NodeRef, DbError> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<NodeRef, DbError> {
        let mut children = vec![self.parse_and()?];
        while self.is_keyword("OR") {
            self.advance();
            children.push(self.parse_and()?);
        }
        if children.len() == 1 {
            Ok(children.pop().unwrap())
        } else {
            let node = QueryTree::new(NodeType::Operator, "OR");
            for c in children {
                QueryTree::push_child(&node, c);
            }
            Ok(node)
        }
    }

    fn parse_and(&mut self) -> Result<NodeRef, DbError> {
        let mut children = vec![self.parse_not()?];
        while self.is_keyword("AND") {
            self.advance();
            children.push(self.parse_not()?);
        }
        if children.len() == 1 {
            Ok(children.pop().unwrap())
        } else {
            let node = QueryTree::new(NodeType::Operator, "AND");
            for c in children {
                QueryTree::push_child(&node, c);
            }
            Ok(node)
        }
    }

    fn parse_not(&mut self) -> Result<NodeRef, DbError> {
        if self.is_keyword("NOT") {
            self.advance();
            let inner = self.parse_not()?;
            let node = QueryTree::new(NodeType::Operator, "NOT");
            QueryTree::push_child(&node, inner);
            Ok(node)
        } else {
            self.parse_predicate()
        }
    }

    fn parse_predicate(&mut self) -> Result<NodeRef, DbError> {
        if matches!(self.peek().kind, TokenKind::LeftParen) {
            self.advance();
            let inner = self.parse_bool_expr()?;
            self.eat(&TokenKind::RightParen)?;
            return Ok(inner);
        }
        if self.is_keyword("EXISTS") {
            self.advance();
            self.eat(&TokenKind::LeftParen)?;
            let sub = self.parse_statement_inside_parens()?;
            self.eat(&TokenKind::RightParen)?;
            let node = QueryTree::new(NodeType::ExistsExpr, "EXISTS");
            QueryTree::push_child(&node, sub);
            return Ok(node);
        }

        let lhs = self.parse_arith_expr()?;

        if self.is_keyword("NOT") {
            self.advance();
            return self.parse_not_predicate_tail(lhs);
        }
        if self.is_keyword("IN") {
            self.advance();
            let list = self.parse_value_list()?;
            let node = QueryTree::new(NodeType::InExpr, "IN");
            QueryTree::push_child(&node, lhs);
            QueryTree::push_child(&node, list);
            return Ok(node);
        }
        if self.is_keyword("BETWEEN") {
            self.advance();
            let lo = self.parse_arith_expr()?;
            self.eat_keyword("AND")?;
            let hi = self.parse_arith_expr()?;
            let node = QueryTree::new(NodeType::BetweenExpr, "BETWEEN");
            QueryTree::push_child(&node, lhs);
            QueryTree::push_child(&node, lo);
            QueryTree::push_child(&node, hi);
            return Ok(node);
        }
        if self.is_keyword("LIKE") {
            self.advance();
            let pat = self.parse_arith_expr()?;
            let node = QueryTree::new(NodeType::LikeExpr, "LIKE");
            QueryTree::push_child(&node, lhs);
            QueryTree::push_child(&node, pat);
            return Ok(node);
        }
        if self.is_keyword("IS") {
            self.advance();
            let negate = if self.is_keyword("NOT") {
                self.advance();
                true
            } else {
                false
            };
            self.eat_keyword("NULL")?;
            let node_type = if negate { NodeType::IsNotNullExpr } else { NodeType::IsNullExpr };
            let node = QueryTree::new(node_type, "IS NULL");
            QueryTree::push_child(&node, lhs);
            return Ok(node);
        }
        if let TokenKind::Comparison(op) = self.peek().kind.clone() {
            self.advance();
            let rhs = self.parse_arith_expr()?;
            let node = QueryTree::new(NodeType::Comparison, op);
            QueryTree::push_child(&node, lhs);
            QueryTree::push_child(&node, rhs);
            return Ok(node);
        }
        Err(self.err("expected comparison, IN, BETWEEN, LIKE, or IS NULL"))
    }

    fn parse_not_predicate_tail(&mut self, lhs: NodeRef) -> Result<NodeRef, DbError> {
        if self.is_keyword("IN") {
            self.advance();
            let list = self.parse_value_list()?;
            let node = QueryTree::new(NodeType::NotInExpr, "NOT IN");
            QueryTree::push_child(&node, lhs);
            QueryTree::push_child(&node, list);
            Ok(node)
        } else if self.is_keyword("BETWEEN") {
            self.advance();
            let lo = self.parse_arith_expr()?;
            self.eat_keyword("AND")?;
            let hi = self.parse_arith_expr()?;
            let node = QueryTree::new(NodeType::NotBetweenExpr, "NOT BETWEEN");
            QueryTree::push_child(&node, lhs);
            QueryTree::push_child(&node, lo);
            QueryTree::push_child(&node, hi);
            Ok(node)
        } else if self.is_keyword("LIKE") {
            self.advance();
            let pat = self.parse_arith_expr()?;
            let node = QueryTree::new(NodeType::NotLikeExpr, "NOT LIKE");
            QueryTree::push_child(&node, lhs);
            QueryTree::push_child(&node, pat);
            Ok(node)
        } else if self.is_keyword("EXISTS") {
            self.advance();
            self.eat(&TokenKind::LeftParen)?;
            let sub = self.parse_statement_inside_parens()?;
            self.eat(&TokenKind::RightParen)?;
            let node = QueryTree::new(NodeType::NotExistsExpr, "NOT EXISTS");
            QueryTree::push_child(&node, sub);
            Ok(node)
        } else {
            Err(self.err("expected IN, BETWEEN, LIKE, or EXISTS after NOT"))
        }
    }

    fn parse_statement_inside_parens(&mut self) -> Result<NodeRef, DbError> {
        self.parse_select()
    }

    fn parse_value_list(&mut self) -> Result<NodeRef, DbError> {
        self.eat(&TokenKind::LeftParen)?;
        let node = QueryTree::new(NodeType::List, "LIST");
        loop {
            let v = self.parse_arith_expr()?;
            QueryTree::push_child(&node, v);
            if matches!(self.peek().kind, TokenKind::Comma) {
                self.advance();
            } else {
                break;
            }
        }
        self.eat(&TokenKind::RightParen)?;
        Ok(node)
    }

    fn parse_arith_expr(&mut self) -> Result<NodeRef, DbError> {
        let mut lhs = self.parse_arith_term()?;
        while let TokenKind::Arithmetic(op) = self.peek().kind.clone() {
            if op != "+" && op != "-" {
                break;
            }
            self.advance();
            let rhs = self.parse_arith_term()?;
            let node = QueryTree::new(NodeType::ArithExpr, op);
            QueryTree::push_child(&node, lhs);
            QueryTree::push_child(&node, rhs);
            lhs = node;
        }
        Ok(lhs)
    }

    fn parse_arith_term(&mut self) -> Result<NodeRef, DbError> {
        let mut lhs = self.parse_primary()?;
        while let TokenKind::Arithmetic(op) = self.peek().kind.clone() {
            if op != "*" && op != "/" {
                break;
            }
            self.advance();
            let rhs = self.parse_primary()?;
            let node = QueryTree::new(NodeType::ArithExpr, op);
            QueryTree::push_child(&node, lhs);
            QueryTree::push_child(&node, rhs);
            lhs = node;
        }
        Ok(lhs)
    }

    fn parse_primary(&mut self) -> Result<NodeRef, DbError> {
        match self.peek().kind.clone() {
            TokenKind::Number(n) => {
                self.advance();
                Ok(QueryTree::new(NodeType::LiteralNumber, n))
            }
            TokenKind::StringLiteral(s) => {
                self.advance();
                Ok(QueryTree::new(NodeType::LiteralString, s))
            }
            TokenKind::Keyword(k) if k == "TRUE" || k == "FALSE" => {
                self.advance();
                Ok(QueryTree::new(NodeType::LiteralBoolean, k))
            }
            TokenKind::Keyword(k) if k == "NULL" => {
                self.advance();
                Ok(QueryTree::new(NodeType::LiteralNull, "NULL"))
            }
            TokenKind::LeftParen => {
                self.advance();
                let inner = self.parse_arith_expr()?;
                self.eat(&TokenKind::RightParen)?;
                Ok(inner)
            }
            TokenKind::Identifier(_) => self.parse_column_ref(),
            _ => Err(self.err("expected expression")),
        }
    }

    // ---- INSERT / UPDATE / DELETE / DDL ----

    fn parse_insert(&mut self) -> Result<NodeRef, DbError> {
        self.advance();
        let table = self.expect_identifier()?;
        let node = QueryTree::new(NodeType::InsertQuery, table);
        let cols = self.parse_ident_list()?;
        let col_list = QueryTree::new(NodeType::ColumnList, "");
        for c in &cols {
            QueryTree::push_child(&col_list, QueryTree::new(NodeType::ColumnName, c.clone()));
        }
        QueryTree::push_child(&node, col_list);

        self.eat_keyword("VALUES")?;
        self.eat(&TokenKind::LeftParen)?;
        let values = QueryTree::new(NodeType::ValuesClause, "");
        let mut count = 0;
        loop {
            let v = self.parse_arith_expr()?;
            QueryTree::push_child(&values, v);
            count += 1;
            if matches!(self.peek().kind, TokenKind::Comma) {
                self.advance();
            } else {
                break;
            }
        }
        self.eat(&TokenKind::RightParen)?;
        if count != cols.len() {
            return Err(self.err("column/value arity mismatch in INSERT"));
        }
        QueryTree::push_child(&node, values);
        let _ = self.eat(&TokenKind::Semicolon);
        Ok(node)
    }

    fn parse_ident_list(&mut self) -> Result<Vec<String>, DbError> {
        self.eat(&TokenKind::LeftParen)?;
        let mut out = vec![self.expect_identifier()?];
        while matches!(self.peek().kind, TokenKind::Comma) {
            self.advance();
            out.push(self.expect_identifier()?);
        }
        self.eat(&TokenKind::RightParen)?;
        Ok(out)
    }

    fn parse_update(&mut self) -> Result<NodeRef, DbError> {
        self.advance();
        let table = self.expect_identifier()?;
        let node = QueryTree::new(NodeType::UpdateQuery, table);
        self.eat_keyword("SET")?;
        loop {
            let col = self.expect_identifier()?;
            if let TokenKind::Comparison(op) = self.peek().kind.clone() {
                if op == "=" {
                    self.advance();
                } else {
                    return Err(self.err("expected ="));
                }
            } else {
                return Err(self.err("expected ="));
            }
            let value = self.parse_arith_expr()?;
            let assign = QueryTree::new(NodeType::Assignment, col);
            QueryTree::push_child(&assign, value);
            QueryTree::push_child(&node, assign);
            if matches!(self.peek().kind, TokenKind::Comma) {
                self.advance();
            } else {
                break;
            }
        }
        if self.is_keyword("WHERE") {
            self.advance();
            let cond = self.parse_bool_expr()?;
            QueryTree::push_child(&node, cond);
        }
        let _ = self.eat(&TokenKind::Semicolon);
        Ok(node)
    }

    fn parse_delete(&mut self) -> Result<NodeRef, DbError> {
        self.advance();
        self.eat_keyword("FROM")?;
        let table = self.expect_identifier()?;
        let node = QueryTree::new(NodeType::DeleteQuery, table);
        if self.is_keyword("WHERE") {
            self.advance();
            let cond = self.parse_bool_expr()?;
            QueryTree::push_child(&node, cond);
        }
        let _ = self.eat(&TokenKind::Semicolon);
        Ok(node)
    }

    fn parse_create_table(&mut self) -> Result<NodeRef, DbError> {
        self.advance();
        let table = self.expect_identifier()?;
        let node = QueryTree::new(NodeType::CreateTable, table);
        let def_list = QueryTree::new(NodeType::ColumnDefList, "");
        self.eat(&TokenKind::LeftParen)?;
        loop {
            let col_name = self.expect_identifier()?;
            let data_type = self.expect_identifier()?;
            let col_def = QueryTree::new(NodeType::ColumnDef, col_name);
            QueryTree::push_child(&col_def, QueryTree::new(NodeType::DataType, data_type));
            if self.is_keyword("PRIMARY KEY") {
                self.advance();
                QueryTree::push_child(&col_def, QueryTree::new(NodeType::PrimaryKey, "PRIMARY KEY"));
            } else if self.is_keyword("FOREIGN KEY") {
                self.advance();
                self.eat_keyword("REFERENCES")?;
                let ref_table = self.expect_identifier()?;
                let cols = self.parse_ident_list()?;
                let fk = QueryTree::new(NodeType::ForeignKey, "FOREIGN KEY");
                let refs = QueryTree::new(NodeType::References, ref_table);
                for c in cols {
                    QueryTree::push_child(&refs, QueryTree::new(NodeType::ColumnName, c));
                }
                QueryTree::push_child(&fk, refs);
                QueryTree::push_child(&col_def, fk);
            }
            QueryTree::push_child(&def_list, col_def);
            if matches!(self.peek().kind, TokenKind::Comma) {
                self.advance();
            } else {
                break;
            }
        }
        self.eat(&TokenKind::RightParen)?;
        QueryTree::push_child(&node, def_list);
        let _ = self.eat(&TokenKind::Semicolon);
        Ok(node)
    }

    fn parse_drop_table(&mut self) -> Result<NodeRef, DbError> {
        self.advance();
        let table = self.expect_identifier()?;
        let node = QueryTree::new(NodeType::DropTable, table);
        if self.is_keyword("CASCADE") || self.is_keyword("RESTRICT") {
            self.advance();
        }
        let _ = self.eat(&TokenKind::Semicolon);
        Ok(node)
    }

    fn expect_identifier(&mut self) -> Result<String, DbError> {
        match self.peek().kind.clone() {
            TokenKind::Identifier(s) => {
                self.advance();
                Ok(s)
            }
            _ => Err(self.err("expected identifier")),
        }
    }

    fn expect_number(&mut self) -> Result<String, DbError> {
        match self.peek().kind.clone() {
            TokenKind::Number(n) => {
                self.advance();
                Ok(n)
            }
            _ => Err(self.err("expected number")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::tree::reset_ids_for_test;

    #[test]
    fn parses_basic_select() {
        reset_ids_for_test();
        let root = parse("SELECT name FROM users WHERE age >= 30;").unwrap();
        assert_eq!(root.borrow().node_type, NodeType::Project);
    }

    #[test]
    fn join_missing_on_and_natural_errors() {
        let err = parse("SELECT * FROM a JOIN b;").unwrap_err();
        assert!(matches!(err, DbError::Parse { .. }));
    }

    #[test]
    fn insert_arity_mismatch_errors() {
        let err = parse("INSERT INTO t (a, b) VALUES (1);").unwrap_err();
        assert!(matches!(err, DbError::Parse { .. }));
    }

    #[test]
    fn unterminated_transaction_block_errors() {
        let err = parse("BEGIN TRANSACTION; SELECT * FROM t;").unwrap_err();
        assert!(matches!(err, DbError::Parse { .. }));
    }

    #[test]
    fn empty_input_errors() {
        let err = parse("").unwrap_err();
        assert!(matches!(err, DbError::Parse { .. }));
    }
}
