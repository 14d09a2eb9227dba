//! Wire protocol between the host and the Julia driver process.
//!
//! A request is a header line `EVAL <nbytes>` followed by exactly `nbytes`
//! of UTF-8 program text. The driver evaluates the text in a fresh anonymous
//! module and answers with a single JSON line, either `{"ok": <value>}` or `{"err": "<message>"}`.
//! Length framing means program text never needs a terminator, so nothing a
//! caller puts inside a string literal can desynchronize the stream.

use serde::Deserialize;
use serde_json::Value;

use crate::error::{Error, Result};

/// Maximum size of a single response line (8 MiB).
/// Centrality and PageRank vectors on large graphs are the biggest payloads.
pub const MAX_RESPONSE_SIZE: usize = 8 * 1024 * 1024;

/// Julia source run with `julia -e` to serve requests on stdin/stdout.
///
/// Julia's own `stdout` is redirected to `stderr` before serving so that
/// package and solver logging cannot leak into the response channel.
///
/// Every request gets its own module. Globals a program defines, such as
/// model variables, disappear with it, so programs must load the packages
/// they use themselves.
pub const DRIVER: &str = r#"
const __graphbees_out = stdout
redirect_stdout(stderr)

__graphbees_emit(io, ::Nothing) = print(io, "null")
__graphbees_emit(io, x::Bool) = print(io, x ? "true" : "false")
__graphbees_emit(io, x::Integer) = print(io, x)
__graphbees_emit(io, x::AbstractFloat) = isfinite(x) ? print(io, Float64(x)) : print(io, "null")
__graphbees_emit(io, x::Real) = __graphbees_emit(io, Float64(x))
__graphbees_emit(io, x::Symbol) = __graphbees_emit(io, String(x))
function __graphbees_emit(io, x::AbstractString)
    print(io, '"')
    for c in x
        if c == '"'
            print(io, "\\\"")
        elseif c == '\\'
            print(io, "\\\\")
        elseif c < ' '
            print(io, "\\u", string(UInt32(c), base = 16, pad = 4))
        else
            print(io, c)
        end
    end
    print(io, '"')
end
function __graphbees_emit(io, xs::Union{Tuple,AbstractVector,AbstractSet})
    print(io, '[')
    for (i, x) in enumerate(xs)
        i > 1 && print(io, ',')
        __graphbees_emit(io, x)
    end
    print(io, ']')
end
function __graphbees_emit(io, d::AbstractDict)
    print(io, '{')
    for (i, (k, v)) in enumerate(d)
        i > 1 && print(io, ',')
        __graphbees_emit(io, string(k))
        print(io, ':')
        __graphbees_emit(io, v)
    end
    print(io, '}')
end
__graphbees_emit(io, x) = __graphbees_emit(io, string(x))

function __graphbees_serve()
    while true
        header = readline(stdin)
        if isempty(header) && eof(stdin)
            break
        end
        reply = IOBuffer()
        try
            startswith(header, "EVAL ") || error("bad request header: " * header)
            n = parse(Int, header[6:end])
            code = String(read(stdin, n))
            value = Base.include_string(Module(:GraphBeesRequest), code, "graphbees")
            body = IOBuffer()
            Base.invokelatest(__graphbees_emit, body, value)
            print(reply, "{\"ok\":", String(take!(body)), "}")
        catch err
            err isa LoadError && (err = err.error)
            reply = IOBuffer()
            print(reply, "{\"err\":")
            __graphbees_emit(reply, sprint(showerror, err))
            print(reply, "}")
        end
        println(__graphbees_out, String(take!(reply)))
        flush(__graphbees_out)
    end
end

__graphbees_serve()
"#;

/// Frame a program for the driver.
pub fn encode_request(code: &str) -> Vec<u8> {
    let mut frame = format!("EVAL {}\n", code.len()).into_bytes();
    frame.extend_from_slice(code.as_bytes());
    frame
}

/// One response line from the driver.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reply {
    Ok(Value),
    Err(String),
}

impl Reply {
    /// Parse a response line.
    pub fn parse(line: &str) -> Result<Self> {
        if line.len() > MAX_RESPONSE_SIZE {
            return Err(Error::OutputTooLarge {
                size: line.len(),
                max: MAX_RESPONSE_SIZE,
            });
        }
        serde_json::from_str(line.trim_end())
            .map_err(|e| Error::Protocol(format!("{e}: {}", preview(line))))
    }

    /// Convert into the evaluated value, surfacing Julia exceptions as
    /// [`Error::Eval`].
    pub fn into_result(self) -> Result<Value> {
        match self {
            Self::Ok(value) => Ok(value),
            Self::Err(message) => Err(Error::Eval(message)),
        }
    }
}

fn preview(line: &str) -> &str {
    let mut end = line.len().min(200);
    while !line.is_char_boundary(end) {
        end -= 1;
    }
    &line[..end]
}
