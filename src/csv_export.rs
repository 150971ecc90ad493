use std::collections::HashMap;

use crate::almanac;
use crate::money;
use crate::store::AlunoRow;

const CABECALHO: [&str; 10] = [
    "Nome",
    "Idade",
    "Responsável",
    "Telefone",
    "Turma",
    "Status",
    "Data nascimento",
    "Valor mensalidade",
    "Projeto social",
    "Observações",
];

fn csv_quote(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

fn write_record(out: &mut String, fields: &[String]) {
    let line: Vec<String> = fields.iter().map(|f| csv_quote(f)).collect();
    out.push_str(&line.join(","));
    out.push_str("\r\n");
}

/// Student roster as CSV: `DD/MM/YYYY` dates, comma decimal separator,
/// booleans as Sim/Não.
pub fn alunos_csv(alunos: &[AlunoRow], turmas: &HashMap<String, String>) -> String {
    let mut out = String::new();
    write_record(
        &mut out,
        &CABECALHO.iter().map(|s| s.to_string()).collect::<Vec<_>>(),
    );
    for aluno in alunos {
        let turma = aluno
            .turma_id
            .as_ref()
            .and_then(|id| turmas.get(id).cloned())
            .unwrap_or_default();
        let nascimento = aluno
            .data_nascimento
            .map(almanac::format_br)
            .unwrap_or_default();
        write_record(
            &mut out,
            &[
                aluno.nome.clone(),
                aluno.idade.to_string(),
                aluno.responsavel.clone(),
                aluno.telefone.clone(),
                turma,
                aluno.status.clone(),
                nascimento,
                money::format_comma(aluno.valor_mensalidade),
                if aluno.projeto_social { "Sim" } else { "Não" }.to_string(),
                aluno.observacoes.clone(),
            ],
        );
    }
    out
}
