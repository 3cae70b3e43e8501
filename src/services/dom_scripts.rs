//! 注入到 AI 页面的脚本
//!
//! 所有脚本都以 `ProviderProfile` 的 JSON 作为参数，同一份脚本适用于全部 AI。

use crate::error::AppResult;
use crate::services::providers::ProviderProfile;

/// 回复节点定位与 DOM 规范化（各脚本共用）
const PRELUDE: &str = r#"
const __after = (el, text) => { if (el.parentNode) el.insertAdjacentText('afterend', text); };
const __before = (el, text) => { if (el.parentNode) el.insertAdjacentText('beforebegin', text); };
const __responses = (p) => document.querySelectorAll(p.responseSelector);
const __pickResponse = (p) => {
  const nodes = __responses(p);
  if (!nodes.length) return null;
  return p.responsePick === 'first' ? nodes[0] : nodes[nodes.length - 1];
};
const __normalize = (node, p) => {
  const root = node.cloneNode(true);
  for (const sel of p.affordanceSelectors) {
    root.querySelectorAll(sel).forEach(el => el.remove());
  }
  root.querySelectorAll('br').forEach(br => br.replaceWith('\n'));
  root.querySelectorAll(p.codeBlockSelector).forEach(block => {
    const text = block.textContent.trim();
    block.textContent = '\n' + text + '\n';
    __before(block, '\n');
    __after(block, '\n');
  });
  root.querySelectorAll('ol').forEach(ol => {
    const start = parseInt(ol.getAttribute('start') || '1', 10) || 1;
    Array.from(ol.children)
      .filter(li => li.tagName === 'LI')
      .forEach((li, i) => { li.textContent = `${start + i}. ${li.textContent.trim()}\n`; });
    __after(ol, '\n');
  });
  root.querySelectorAll('ul').forEach(ul => {
    Array.from(ul.children)
      .filter(li => li.tagName === 'LI')
      .forEach(li => { li.textContent = `• ${li.textContent.trim()}\n`; });
    __after(ul, '\n');
  });
  root.querySelectorAll('p').forEach(el => __after(el, '\n'));
  root.querySelectorAll('h1, h2, h3, h4, h5, h6').forEach(h => {
    __before(h, '\n');
    __after(h, '\n');
  });
  return root.textContent.replace(/\n{3,}/g, '\n\n').trim();
};
"#;

/// 输入框是否存在
pub fn check_ready_script(profile: &ProviderProfile) -> AppResult<String> {
    let selector = serde_json::to_string(profile.input_selector)?;
    Ok(format!(
        r#"(() => !!document.querySelector({selector}))()"#,
        selector = selector
    ))
}

/// 填写问题并提交
///
/// 返回 `{ ok, error?, baseline }`，baseline 为提交前的回复节点数量。
pub fn submit_script(profile: &ProviderProfile, question: &str) -> AppResult<String> {
    let profile_json = serde_json::to_string(profile)?;
    let question_json = serde_json::to_string(question)?;
    Ok(format!(
        r#"
        (async () => {{
            {prelude}
            const p = {profile};
            const question = {question};
            const sleep = ms => new Promise(r => setTimeout(r, ms));
            const input = document.querySelector(p.inputSelector);
            if (!input) {{
                return {{ ok: false, error: 'input_not_found', baseline: 0 }};
            }}
            const baseline = __responses(p).length;
            input.focus();

            switch (p.inputMethod) {{
                case 'textarea_value': {{
                    const desc = Object.getOwnPropertyDescriptor(Object.getPrototypeOf(input), 'value');
                    if (desc && desc.set) {{ desc.set.call(input, question); }} else {{ input.value = question; }}
                    input.dispatchEvent(new Event('input', {{ bubbles: true }}));
                    input.dispatchEvent(new Event('change', {{ bubbles: true }}));
                    break;
                }}
                case 'content_editable_paste': {{
                    document.execCommand('selectAll', false, null);
                    document.execCommand('delete', false, null);
                    const data = new DataTransfer();
                    data.setData('text/plain', question);
                    input.dispatchEvent(new ClipboardEvent('paste', {{
                        clipboardData: data, bubbles: true, cancelable: true
                    }}));
                    await sleep(100);
                    if (!input.textContent.trim()) {{
                        input.innerText = question;
                        input.dispatchEvent(new Event('input', {{ bubbles: true }}));
                    }}
                    break;
                }}
                case 'exec_command_insert': {{
                    document.execCommand('selectAll', false, null);
                    document.execCommand('delete', false, null);
                    document.execCommand('insertText', false, question);
                    if (!(input.value || input.textContent || '').trim()) {{
                        input.innerText = question;
                        input.dispatchEvent(new Event('input', {{ bubbles: true }}));
                    }}
                    break;
                }}
                case 'paragraph_replace': {{
                    input.innerHTML = '';
                    for (const line of question.split('\n')) {{
                        const para = document.createElement('p');
                        if (line) {{ para.textContent = line; }} else {{ para.appendChild(document.createElement('br')); }}
                        input.appendChild(para);
                    }}
                    input.dispatchEvent(new Event('input', {{ bubbles: true }}));
                    break;
                }}
            }}
            await sleep(200);

            const pressEnter = () => input.dispatchEvent(new KeyboardEvent('keydown', {{
                key: 'Enter', code: 'Enter', keyCode: 13, which: 13, bubbles: true
            }}));
            const clickWhenEnabled = async (selector) => {{
                for (let i = 0; i < 50; i++) {{
                    const button = document.querySelector(selector);
                    if (button && !button.disabled && button.getAttribute('aria-disabled') !== 'true') {{
                        button.click();
                        return true;
                    }}
                    await sleep(100);
                }}
                return false;
            }};

            const s = p.submit;
            if (s.kind === 'enter_key') {{
                pressEnter();
            }} else if (s.kind === 'button') {{
                if (!(await clickWhenEnabled(s.selector))) {{ pressEnter(); }}
            }} else {{
                pressEnter();
                await sleep(500);
                if ((input.value || input.textContent || '').trim()) {{
                    await clickWhenEnabled(s.selector);
                }}
            }}
            return {{ ok: true, baseline }};
        }})()
        "#,
        prelude = PRELUDE,
        profile = profile_json,
        question = question_json
    ))
}

/// 读取当前回复状态
///
/// 返回 `{ generating, content, responses }`。
pub fn snapshot_script(profile: &ProviderProfile) -> AppResult<String> {
    let profile_json = serde_json::to_string(profile)?;
    Ok(format!(
        r#"
        (() => {{
            {prelude}
            const p = {profile};
            const responses = __responses(p).length;
            const response = __pickResponse(p);
            const contentNode = response && p.contentSelector
                ? response.querySelector(p.contentSelector)
                : response;

            let generating = false;
            for (const ind of p.generating) {{
                switch (ind.kind) {{
                    case 'stop_control':
                        if (document.querySelector(ind.selector)) generating = true;
                        break;
                    case 'stop_in_response':
                        if (response && response.querySelector(ind.selector)) generating = true;
                        break;
                    case 'missing_control': {{
                        if (!response) break;
                        const scope = ind.in_parent ? response.parentElement : response;
                        if (!(scope && scope.querySelector(ind.selector))) generating = true;
                        break;
                    }}
                    case 'streaming_class':
                        if (contentNode && (contentNode.classList.contains(ind.class_name)
                            || contentNode.closest('.' + ind.class_name))) generating = true;
                        break;
                    case 'stop_text': {{
                        if (!response) break;
                        const stop = Array.from(response.querySelectorAll('span'))
                            .some(span => span.textContent.trim() === ind.text);
                        if (stop && !response.querySelector(ind.done_selector)) generating = true;
                        break;
                    }}
                }}
            }}

            return {{
                generating,
                content: contentNode ? __normalize(contentNode, p) : null,
                responses
            }};
        }})()
        "#,
        prelude = PRELUDE,
        profile = profile_json
    ))
}

/// 主显示器可用区域（在答题页面执行）
pub const WORK_AREA_SCRIPT: &str = r#"
(() => ({
    left: screen.availLeft || 0,
    top: screen.availTop || 0,
    width: screen.availWidth,
    height: screen.availHeight
}))()
"#;
